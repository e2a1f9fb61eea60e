use log::debug;
use log::info;
use log::warn;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::basic_types::Solution;
use crate::calabash_assert_moderate;
use crate::engine::VariableId;
use crate::engine::Wcsp;
use crate::local_search;
use crate::local_search::LocalSearchOptions;
use crate::search::termination::TerminationCondition;
use crate::search::value_selection::select_value;
use crate::search::value_selection::ValueOrdering;
use crate::search::variable_selection::select_variable;
use crate::search::variable_selection::VariableOrdering;
use crate::search::BranchingStrategy;
use crate::statistics::SolverStatistics;

/// Options steering the branch-and-bound search.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub branching: BranchingStrategy,
    pub variable_ordering: VariableOrdering,
    pub value_ordering: ValueOrdering,
    /// Run discrepancy-limited passes with doubling limits up to this bound
    /// before the complete pass.
    pub lds: Option<u64>,
    /// Enumerate solutions below the bound instead of optimising.
    pub enumerate: bool,
    /// Stop after this many solutions (enumeration mode).
    pub solution_limit: Option<u64>,
    /// Seed initial upper bound by local search before the tree search.
    pub local_search: Option<LocalSearchOptions>,
    /// Enumerated domains at least this large branch by dichotomic splits.
    pub dichotomic_threshold: u64,
    pub random_seed: u64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            branching: BranchingStrategy::default(),
            variable_ordering: VariableOrdering::default(),
            value_ordering: ValueOrdering::default(),
            lds: None,
            enumerate: false,
            solution_limit: None,
            local_search: None,
            dichotomic_threshold: 10,
            random_seed: 91648253,
        }
    }
}

/// The outcome of [`Solver::solve`].
#[derive(Debug)]
pub enum SolveResult {
    /// The recorded solution is optimal below the initial bound.
    Optimal(Solution),
    /// No solution exists strictly below the initial upper bound.
    Unsatisfiable,
    /// Enumeration mode: the number of solutions found below the bound.
    Enumerated(u64),
    /// A resource limit was reached; the best solution found so far, if any.
    Interrupted(Option<Solution>),
}

/// Why the search unwound early.
enum StopSearch {
    Interrupted,
    SolutionLimit,
}

/// Depth-first branch and bound over a [`Wcsp`].
pub struct Solver {
    wcsp: Wcsp,
    options: SolverOptions,
    statistics: SolverStatistics,
    incumbent: Option<Solution>,
    last_conflict: Option<VariableId>,
    rng: SmallRng,
    solution_callback: Option<Box<dyn FnMut(&Wcsp, &Solution)>>,
}

impl std::fmt::Debug for Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("wcsp", &self.wcsp)
            .field("options", &self.options)
            .field("statistics", &self.statistics)
            .finish()
    }
}

impl Solver {
    pub fn new(wcsp: Wcsp) -> Solver {
        Solver::with_options(wcsp, SolverOptions::default())
    }

    pub fn with_options(wcsp: Wcsp, options: SolverOptions) -> Solver {
        let rng = SmallRng::seed_from_u64(options.random_seed);
        Solver {
            wcsp,
            options,
            statistics: SolverStatistics::default(),
            incumbent: None,
            last_conflict: None,
            rng,
            solution_callback: None,
        }
    }

    pub fn wcsp(&self) -> &Wcsp {
        &self.wcsp
    }

    pub fn statistics(&self) -> &SolverStatistics {
        &self.statistics
    }

    /// Invoke `callback` on every solution as it is recorded.
    pub fn on_solution(&mut self, callback: impl FnMut(&Wcsp, &Solution) + 'static) {
        self.solution_callback = Some(Box::new(callback));
    }

    /// Preprocess, optionally seed an initial upper bound, then run the
    /// branch-and-bound search to completion or until `termination` triggers.
    pub fn solve(&mut self, termination: &mut dyn TerminationCondition) -> SolveResult {
        self.wcsp.options_mut().enumerate = self.options.enumerate;
        self.wcsp.close();

        self.statistics.num_propagations += 1;
        if self.wcsp.propagate().is_err() {
            info!("preprocessing proves there is no solution under the bound");
            return self.completed_result();
        }
        debug!(
            "preprocessing done: lb {}, ub {}",
            self.wcsp.lower_bound(),
            self.wcsp.upper_bound()
        );

        if let Some(local_search_options) = self.options.local_search {
            if self.options.enumerate {
                warn!("upper-bound seeding is disabled in enumeration mode");
            } else if let Some(solution) =
                local_search::seed_upper_bound(&self.wcsp, &local_search_options, &mut self.rng)
            {
                info!("local search found an initial bound of {}", solution.cost());
                self.wcsp.update_upper_bound(solution.cost());
                self.incumbent = Some(solution);
            }
        }

        let outcome = self.run_passes(termination);
        match outcome {
            Ok(()) => self.completed_result(),
            Err(StopSearch::SolutionLimit) if self.options.enumerate => {
                SolveResult::Enumerated(self.statistics.num_solutions)
            }
            Err(_) => SolveResult::Interrupted(self.incumbent.clone()),
        }
    }

    fn completed_result(&self) -> SolveResult {
        if self.options.enumerate {
            SolveResult::Enumerated(self.statistics.num_solutions)
        } else {
            match &self.incumbent {
                Some(solution) => SolveResult::Optimal(solution.clone()),
                None => SolveResult::Unsatisfiable,
            }
        }
    }

    fn run_passes(
        &mut self,
        termination: &mut dyn TerminationCondition,
    ) -> Result<(), StopSearch> {
        if let Some(max_discrepancy) = self.options.lds {
            if self.options.enumerate {
                warn!("limited discrepancy search is disabled in enumeration mode");
            } else {
                let mut discrepancy = 1;
                while discrepancy < max_discrepancy {
                    debug!("discrepancy-limited pass with budget {discrepancy}");
                    if !self.run_pass(termination, discrepancy as i64)? {
                        // The root is already closed under the tightened
                        // bound; the incumbent is optimal.
                        return Ok(());
                    }
                    discrepancy *= 2;
                }
            }
        }
        let _ = self.run_pass(termination, i64::MAX)?;
        Ok(())
    }

    /// One search pass from the root. Returns `false` when the root itself is
    /// inconsistent under the current bound.
    fn run_pass(
        &mut self,
        termination: &mut dyn TerminationCondition,
        discrepancy: i64,
    ) -> Result<bool, StopSearch> {
        self.statistics.num_propagations += 1;
        if self.wcsp.propagate().is_err() {
            return Ok(false);
        }
        let root_depth = self.wcsp.depth();
        let result = self.recurse(termination, discrepancy);
        self.wcsp.restore(root_depth);
        result.map(|_| true)
    }

    fn recurse(
        &mut self,
        termination: &mut dyn TerminationCondition,
        discrepancy: i64,
    ) -> Result<(), StopSearch> {
        if termination.should_stop() {
            return Err(StopSearch::Interrupted);
        }
        let Some(variable) =
            select_variable(&self.wcsp, self.options.variable_ordering, self.last_conflict)
        else {
            return self.record_solution();
        };

        termination.notify_node();
        self.statistics.num_nodes += 1;

        let store = self.wcsp.store();
        let split = !self.wcsp.variable(variable).is_enumerated()
            || (self.options.branching == BranchingStrategy::Binary
                && self.wcsp.variable(variable).size(store) >= self.options.dichotomic_threshold);
        if split {
            self.split_choice_point(termination, variable, discrepancy)
        } else if self.options.branching == BranchingStrategy::KAry {
            self.kary_choice_point(termination, variable, discrepancy)
        } else {
            self.binary_choice_point(termination, variable, discrepancy)
        }
    }

    /// Left branch `x = v`, right branch `x != v`.
    fn binary_choice_point(
        &mut self,
        termination: &mut dyn TerminationCondition,
        variable: VariableId,
        discrepancy: i64,
    ) -> Result<(), StopSearch> {
        let value = select_value(
            &self.wcsp,
            variable,
            self.options.value_ordering,
            self.incumbent.as_ref(),
        );
        let depth = self.wcsp.depth();

        self.wcsp.store_frame();
        self.statistics.num_propagations += 1;
        let status = self
            .wcsp
            .assign(variable, value)
            .and_then(|_| self.wcsp.propagate());
        match status {
            Ok(()) => self.recurse(termination, discrepancy)?,
            Err(_) => self.note_conflict(variable),
        }
        self.wcsp.restore(depth);

        if discrepancy == 0 {
            return Ok(());
        }
        self.wcsp.store_frame();
        self.statistics.num_propagations += 1;
        let status = self
            .wcsp
            .remove(variable, value as usize)
            .and_then(|_| self.wcsp.propagate());
        match status {
            Ok(()) => self.recurse(termination, discrepancy - 1)?,
            Err(_) => self.note_conflict(variable),
        }
        self.wcsp.restore(depth);
        Ok(())
    }

    /// Dichotomic split on the domain midpoint, used for interval variables
    /// and large enumerated domains.
    fn split_choice_point(
        &mut self,
        termination: &mut dyn TerminationCondition,
        variable: VariableId,
        discrepancy: i64,
    ) -> Result<(), StopSearch> {
        let store = self.wcsp.store();
        let inf = self.wcsp.variable(variable).inf(store);
        let sup = self.wcsp.variable(variable).sup(store);
        let middle = inf + (sup - inf) / 2;
        let depth = self.wcsp.depth();

        self.wcsp.store_frame();
        self.statistics.num_propagations += 1;
        let status = self
            .wcsp
            .decrease(variable, middle)
            .and_then(|_| self.wcsp.propagate());
        match status {
            Ok(()) => self.recurse(termination, discrepancy)?,
            Err(_) => self.note_conflict(variable),
        }
        self.wcsp.restore(depth);

        if discrepancy == 0 {
            return Ok(());
        }
        self.wcsp.store_frame();
        self.statistics.num_propagations += 1;
        let status = self
            .wcsp
            .increase(variable, middle + 1)
            .and_then(|_| self.wcsp.propagate());
        match status {
            Ok(()) => self.recurse(termination, discrepancy - 1)?,
            Err(_) => self.note_conflict(variable),
        }
        self.wcsp.restore(depth);
        Ok(())
    }

    /// Enumerate every value of the domain, cheapest unary cost first.
    fn kary_choice_point(
        &mut self,
        termination: &mut dyn TerminationCondition,
        variable: VariableId,
        discrepancy: i64,
    ) -> Result<(), StopSearch> {
        let store = self.wcsp.store();
        let x = self.wcsp.variable(variable);
        let mut values: Vec<usize> = x.domain_iter(store).collect();
        values.sort_by_key(|&value| x.unary_cost(store, value));

        let depth = self.wcsp.depth();
        for (rank, value) in values.into_iter().enumerate() {
            let remaining = discrepancy - rank as i64;
            if remaining < 0 {
                break;
            }
            self.wcsp.store_frame();
            self.statistics.num_propagations += 1;
            let status = self
                .wcsp
                .assign(variable, value as i64)
                .and_then(|_| self.wcsp.propagate());
            match status {
                Ok(()) => {
                    let result = self.recurse(termination, remaining);
                    self.wcsp.restore(depth);
                    result?
                }
                Err(_) => {
                    self.note_conflict(variable);
                    self.wcsp.restore(depth);
                }
            }
        }
        Ok(())
    }

    fn note_conflict(&mut self, variable: VariableId) {
        self.statistics.num_backtracks += 1;
        self.last_conflict = Some(variable);
    }

    /// All variables are assigned: verify, record, tighten the bound and
    /// unwind to the enclosing choice point.
    fn record_solution(&mut self) -> Result<(), StopSearch> {
        let values = self.wcsp.current_values();
        let cost = self.wcsp.lower_bound();
        let original = self.wcsp.assignment_cost(&values);
        if original != cost {
            warn!(
                "solution cost {cost} diverges from its recomputed original cost {original}"
            );
        }
        calabash_assert_moderate!(original == cost);

        let solution = Solution::new(values, cost);
        self.statistics.num_solutions += 1;
        if !self.options.enumerate {
            self.wcsp.update_upper_bound(cost);
            info!(
                "new solution with cost {} ({} nodes, {} backtracks)",
                cost, self.statistics.num_nodes, self.statistics.num_backtracks
            );
        }
        if let Some(callback) = self.solution_callback.as_mut() {
            callback(&self.wcsp, &solution);
        }
        self.incumbent = Some(solution);

        if let Some(limit) = self.options.solution_limit {
            if self.statistics.num_solutions >= limit {
                return Err(StopSearch::SolutionLimit);
            }
        }
        Ok(())
    }
}
