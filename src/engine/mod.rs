mod events;
pub(crate) mod propagation_context;
pub(crate) mod queues;
mod variable;
mod wcsp;

pub use events::DomainEvent;
pub use events::DomainListener;
pub use variable::Variable;
pub use variable::VariableId;
pub use wcsp::ConsistencyLevel;
pub use wcsp::PropagationOptions;
pub use wcsp::Wcsp;
