pub mod engine;
pub mod states;

pub use engine::{ApprovalFlow, FlowTransitionError};
pub use states::{ApprovalEvent, TransitionOutcome};
