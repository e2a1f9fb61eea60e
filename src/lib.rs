//! # Calabash
//! Calabash is a solver for weighted constraint satisfaction problems
//! (WCSP): discrete variables with finite domains, cost functions over
//! subsets of them, and the goal of finding a complete assignment whose total
//! cost is minimal and strictly below a given bound. Hard constraints are
//! cost functions whose forbidden tuples cost at least the bound.
//!
//! The engine is a depth-first branch-and-bound search over a reversible
//! trailing store. During search it maintains soft local consistency (node,
//! arc, directed and existential arc consistency) by moving cost between the
//! functions, the unary cost vectors and the global lower bound through
//! equivalence-preserving transformations, so that the lower bound reported
//! at every node is valid for all completions.
//!
//! Problems are built through [`Wcsp`] or loaded from the `wcsp`, `cfn`,
//! `wcnf`/`cnf`, `qpbo` and `uai` formats by the [`parsers`] module:
//! ```rust
//! use calabash_solver::search::termination::Indefinite;
//! use calabash_solver::search::{SolveResult, Solver};
//! use calabash_solver::Wcsp;
//!
//! let mut wcsp = Wcsp::new();
//! let x = wcsp.new_enumerated_variable(3, "x");
//! wcsp.post_unary(x, &[5, 2, 7]);
//! wcsp.update_upper_bound(10);
//!
//! let mut solver = Solver::new(wcsp);
//! match solver.solve(&mut Indefinite) {
//!     SolveResult::Optimal(solution) => {
//!         assert_eq!(solution.cost(), 2);
//!         assert_eq!(solution.value(0), 1);
//!     }
//!     _ => panic!("this problem has a solution"),
//! }
//! ```
//!
//! ## Feature flags
//! - `debug-checks`: enable the expensive internal assertions; several orders
//!   of magnitude slower, off by default.

pub mod asserts;
pub mod basic_types;
pub mod containers;
pub mod cost_function;
pub mod engine;
pub mod local_search;
pub mod parsers;
pub mod search;
pub mod statistics;
pub mod store;

pub use basic_types::Cost;
pub use basic_types::CostScale;
pub use basic_types::Solution;
pub use cost_function::CostFunctionId;
pub use engine::ConsistencyLevel;
pub use engine::DomainEvent;
pub use engine::DomainListener;
pub use engine::VariableId;
pub use engine::Wcsp;
