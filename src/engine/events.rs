use enumset::EnumSetType;

use crate::engine::VariableId;

/// The kind of domain tightening applied to a variable.
#[derive(EnumSetType, Debug)]
pub enum DomainEvent {
    /// A single value was removed from the domain.
    Removal,
    /// The domain minimum was raised.
    LowerBound,
    /// The domain maximum was lowered.
    UpperBound,
    /// The domain was reduced to a single value.
    Assign,
}

/// Observer of domain changes, owned by the problem instance.
///
/// The core publishes every domain change to the registered listeners;
/// embedding layers (e.g. a meta-constraint solving a nested problem)
/// subscribe here instead of hooking process-wide callbacks.
pub trait DomainListener {
    fn on_event(&mut self, problem_id: u32, variable: VariableId, event: DomainEvent);
}
