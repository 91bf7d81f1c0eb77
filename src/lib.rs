//! turnloop - streaming, tool-using conversation engine
//!
//! Drives repeated rounds of model streaming and tool execution for a
//! conversation until the model produces a final answer, while pushing
//! partial output to a UI-agnostic event sink.

pub mod config;
pub mod events;
pub mod history;
pub mod llm;
pub mod runtime;
pub mod state_machine;
pub mod tools;

pub use config::{EngineConfig, ToolFailurePolicy};
pub use events::{EventSink, StreamEvent};
pub use history::{Message, MessageHistory, Role, ToolCall, ToolResult};
pub use runtime::{ConversationEngine, EngineError, SessionManager, TurnHandle, TurnOutcome};
