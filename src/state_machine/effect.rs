//! Effects produced by state transitions

use crate::events::StreamEvent;
use crate::history::{Message, ToolCall};

/// Work for the executor, run in order after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append a message to the history
    Append(Message),

    /// Push an event to the sink
    Emit(StreamEvent),

    /// Open a model stream over the current history
    RequestStream,

    /// Invoke a tool; the executor reports back with `ToolCompleted`
    InvokeTool { call: ToolCall },
}

impl Effect {
    pub fn turn_error(reason: impl Into<String>) -> Self {
        Effect::Emit(StreamEvent::TurnError {
            reason: reason.into(),
        })
    }

    pub fn tool_invoked(call: &ToolCall) -> Self {
        Effect::Emit(StreamEvent::ToolInvoked {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        })
    }
}
