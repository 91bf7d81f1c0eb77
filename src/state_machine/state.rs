//! Turn state types

use crate::history::{MessageHistory, ToolCall};
use crate::llm::LlmErrorKind;
use serde::Serialize;
use std::fmt;

/// Why a turn ended in error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum TurnErrorKind {
    /// Opening or reading the model stream failed
    ModelStream(LlmErrorKind),
    /// The model was still requesting tools after the last allowed round
    IterationLimit,
    Cancelled,
    /// A tool failed under the abort-turn policy
    ToolFailure,
    /// The engine could not maintain its own invariants
    Internal,
}

/// Coarse status of a conversation's current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Idle,
    Streaming,
    Dispatching,
    Done,
    Error,
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnStatus::Idle => "idle",
            TurnStatus::Streaming => "streaming",
            TurnStatus::Dispatching => "dispatching",
            TurnStatus::Done => "done",
            TurnStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// State of the turn loop
///
/// `iteration` counts model rounds started in the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,

    /// Consuming a model stream
    Streaming { iteration: u32 },

    /// Running the tool calls requested by the last round, one at a time
    Dispatching {
        iteration: u32,
        current: ToolCall,
        remaining: Vec<ToolCall>,
    },

    Done { iteration: u32 },

    Error {
        iteration: u32,
        message: String,
        kind: TurnErrorKind,
    },
}

impl TurnState {
    pub fn status(&self) -> TurnStatus {
        match self {
            TurnState::Idle => TurnStatus::Idle,
            TurnState::Streaming { .. } => TurnStatus::Streaming,
            TurnState::Dispatching { .. } => TurnStatus::Dispatching,
            TurnState::Done { .. } => TurnStatus::Done,
            TurnState::Error { .. } => TurnStatus::Error,
        }
    }

    pub fn iteration(&self) -> u32 {
        match self {
            TurnState::Idle => 0,
            TurnState::Streaming { iteration }
            | TurnState::Dispatching { iteration, .. }
            | TurnState::Done { iteration }
            | TurnState::Error { iteration, .. } => *iteration,
        }
    }

    /// A turn is running and a new user message must be rejected
    pub fn is_busy(&self) -> bool {
        matches!(self, TurnState::Streaming { .. } | TurnState::Dispatching { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Done { .. } | TurnState::Error { .. })
    }
}

/// Everything the engine keeps for one conversation
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub history: MessageHistory,
    /// Rounds used by the current (or last) turn; reset when a turn starts
    pub iteration: u32,
    pub status: TurnState,
}

impl ConversationState {
    pub fn new(system_prompt: Option<&str>) -> Self {
        let history = match system_prompt {
            Some(prompt) => MessageHistory::with_system(prompt),
            None => MessageHistory::new(),
        };
        Self {
            history,
            iteration: 0,
            status: TurnState::Idle,
        }
    }
}
