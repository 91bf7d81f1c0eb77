//! Turn loop state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions. The
//! executor in [`crate::runtime`] feeds events in and carries out effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{ConversationState, TurnErrorKind, TurnState, TurnStatus};
pub use transition::{
    transition, TransitionError, TransitionResult, CANCELLED_REASON, ITERATION_LIMIT_REASON,
};
