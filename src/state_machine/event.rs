//! Events fed into the state machine

use crate::history::{ToolCall, ToolResult};
use crate::llm::LlmError;

/// Inputs to [`transition`](super::transition)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller submitted a new turn
    UserMessage { text: String },

    /// The model stream ended normally
    StreamCompleted {
        content: String,
        tool_calls: Vec<ToolCall>,
    },

    /// The model stream could not be opened or broke mid-way
    StreamFailed { error: LlmError },

    /// The current tool call finished, successfully or not
    ToolCompleted { result: ToolResult },

    /// The caller's cancellation signal fired
    Cancelled,

    /// The executor could not apply an effect
    InternalError { message: String },
}
