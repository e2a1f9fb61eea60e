/// Signal that a propagation step derived `lb >= ub` or emptied a domain.
///
/// A contradiction carries no payload; it is propagated with `?` through every
/// mutator below the propagation loop and caught at the nearest choice point
/// during search (fatal at preprocessing time). Mutators leave the store in a
/// restorable state before raising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contradiction;

pub type PropagationStatus = Result<(), Contradiction>;
