//! Cost functions and the equivalence-preserving transformations (EPTs)
//! through which all soft consistencies move cost.
//!
//! A cost function owns its immutable structure (scope, original cost table);
//! every mutable quantity (the per-dimension deltas accumulated by EPTs and
//! the connection flag) is a reversible slot in the [`Store`](crate::store::Store).
//! The *effective* cost of a tuple is the stored cost minus the deltas of the
//! tuple's values; projections and extensions adjust deltas and unary costs
//! together so that the total cost of every complete assignment is preserved.

mod binary;
mod nary;
mod ternary;

pub use binary::BinaryCostFunction;
pub use nary::NaryCostFunction;
pub use ternary::TernaryCostFunction;

use crate::basic_types::Cost;
use crate::basic_types::PropagationStatus;
use crate::containers::StorageKey;
use crate::engine::propagation_context::DomainView;
use crate::engine::propagation_context::PropagationContext;
use crate::engine::VariableId;
use crate::store::StateInt;
use crate::store::Store;

#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct CostFunctionId {
    id: u32,
}

impl StorageKey for CostFunctionId {
    fn index(&self) -> usize {
        self.id as usize
    }

    fn create_from_index(index: usize) -> Self {
        CostFunctionId { id: index as u32 }
    }
}

impl std::fmt::Display for CostFunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.id)
    }
}

impl std::fmt::Debug for CostFunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.id)
    }
}

/// The contract every cost function implements towards the propagation
/// engine. Methods take `&self`: all mutation flows through the reversible
/// slots held by the context.
pub(crate) trait CostFunction: std::fmt::Debug {
    fn scope(&self) -> &[VariableId];

    fn arity(&self) -> usize {
        self.scope().len()
    }

    /// The reversible connection flag; a deconnected function no longer
    /// participates in propagation nor contributes cost.
    fn connected_slot(&self) -> StateInt;

    fn is_connected(&self, store: &Store) -> bool {
        store.get(self.connected_slot()) != 0
    }

    /// Effective cost of `tuple` (scope order), deltas included.
    fn eval(&self, store: &Store, tuple: &[usize]) -> Cost;

    /// The cost of `tuple` as loaded, before any EPT. Used for solution
    /// verification and read-only evaluation.
    fn original_cost(&self, tuple: &[usize]) -> Cost;

    /// Minimum effective cost over the current domains, with the variable at
    /// `pos` fixed to `value`.
    fn min_cost_given(&self, view: DomainView<'_>, pos: usize, value: usize) -> Cost;

    /// One tuple witnessing [`CostFunction::min_cost_given`].
    fn support_of(&self, view: DomainView<'_>, pos: usize, value: usize) -> Option<Vec<usize>>;

    /// Minimum over the current domains of the effective cost plus the unary
    /// costs of the other scope variables, with the variable at `pos` fixed
    /// to `value` (the quantity driven to zero by full supports).
    fn full_support_cost(&self, view: DomainView<'_>, pos: usize, value: usize) -> Cost;

    /// Re-establish (generalised) arc consistency for the variable at `pos`:
    /// project the minimum support cost of each of its values into its unary
    /// cost.
    fn find_supports(&self, ctx: &mut PropagationContext<'_>, pos: usize);

    /// Re-establish full supports for the variable at `pos`, drawing the
    /// needed cost out of the unary costs of the other scope variables.
    fn find_full_supports(&self, ctx: &mut PropagationContext<'_>, pos: usize);

    /// React to the assignment of a scope variable: once at most one scope
    /// variable remains unassigned the function projects itself away and
    /// deconnects.
    fn on_assignment(&self, ctx: &mut PropagationContext<'_>) -> PropagationStatus;

    /// For dead-end elimination: the worst case, over all completions `t` in
    /// the current domains, of `eval(candidate, t) - eval(removed, t)`. The
    /// value `removed` is dominated by `candidate` when this plus the unary
    /// cost of `candidate` stays at or below the unary cost of `removed`.
    /// `None` when the function cannot answer cheaply.
    fn worst_advantage(
        &self,
        view: DomainView<'_>,
        pos: usize,
        candidate: usize,
        removed: usize,
    ) -> Option<Cost>;

    /// Visit every tuple with a non-default original cost, in lexicographic
    /// order.
    fn for_each_original_tuple(&self, visit: &mut dyn FnMut(&[usize], Cost));

    /// The default original cost of tuples not visited by
    /// [`CostFunction::for_each_original_tuple`].
    fn default_cost(&self) -> Cost {
        0
    }
}

/// Scope positions whose variable is not yet assigned.
pub(crate) fn unassigned_positions(view: DomainView<'_>, scope: &[VariableId]) -> Vec<usize> {
    scope
        .iter()
        .enumerate()
        .filter(|(_, &variable)| !view.variable(variable).is_assigned(view.store))
        .map(|(pos, _)| pos)
        .collect()
}
