//! Conversation history
//!
//! Append-only, ordered record of a conversation. Every append is validated;
//! there is no API to mutate or remove a message once it has been accepted.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A model-requested tool invocation
///
/// `arguments` is opaque serialized data; the engine never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool message answering the call named by `result.tool_call_id`
    pub fn tool(result: &ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: result.text().to_string(),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.tool_call_id.clone()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// What a tool call produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum ToolOutcome {
    Output(String),
    Failure(String),
}

/// Result of one tool call: either output or a failure description, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn output(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome: ToolOutcome::Output(text.into()),
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome: ToolOutcome::Failure(reason.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failure(_))
    }

    /// The output text, or the failure description
    pub fn text(&self) -> &str {
        match &self.outcome {
            ToolOutcome::Output(text) | ToolOutcome::Failure(text) => text,
        }
    }
}

/// Rejected appends
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("a system message may only appear first")]
    SystemNotFirst,
    #[error("history already has a system message")]
    DuplicateSystem,
    #[error("tool message is missing its tool_call_id")]
    MissingToolCallId,
    #[error("tool result {0} does not answer a call in the preceding assistant message")]
    OrphanToolResult(String),
    #[error("only assistant messages may carry tool calls (got {0:?})")]
    UnexpectedToolCalls(Role),
    #[error("only tool messages may carry a tool_call_id (got {0:?})")]
    UnexpectedToolCallId(Role),
    #[error("duplicate tool call id {0} in assistant message")]
    DuplicateToolCallId(String),
}

/// Append-only message history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHistory {
    messages: Vec<Message>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History that starts with a system prompt
    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    /// Validate and append a message
    pub fn append(&mut self, message: Message) -> Result<(), HistoryError> {
        self.validate(&message)?;
        self.messages.push(message);
        Ok(())
    }

    /// Ordered copy of the history, for handing to a model adapter
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages with the given role
    pub fn count(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    fn validate(&self, message: &Message) -> Result<(), HistoryError> {
        if !message.tool_calls.is_empty() && message.role != Role::Assistant {
            return Err(HistoryError::UnexpectedToolCalls(message.role));
        }
        if message.tool_call_id.is_some() && message.role != Role::Tool {
            return Err(HistoryError::UnexpectedToolCallId(message.role));
        }

        match message.role {
            Role::System => {
                if self.messages.iter().any(|m| m.role == Role::System) {
                    Err(HistoryError::DuplicateSystem)
                } else if !self.messages.is_empty() {
                    Err(HistoryError::SystemNotFirst)
                } else {
                    Ok(())
                }
            }
            Role::User => Ok(()),
            Role::Assistant => {
                let mut seen = HashSet::new();
                for call in &message.tool_calls {
                    if !seen.insert(call.id.as_str()) {
                        return Err(HistoryError::DuplicateToolCallId(call.id.clone()));
                    }
                }
                Ok(())
            }
            Role::Tool => {
                let id = message
                    .tool_call_id
                    .as_deref()
                    .ok_or(HistoryError::MissingToolCallId)?;
                // Only other tool results may sit between a result and its call
                let preceding = self.messages.iter().rev().find(|m| m.role != Role::Tool);
                match preceding {
                    Some(assistant)
                        if assistant.role == Role::Assistant
                            && assistant.tool_calls.iter().any(|c| c.id == id) =>
                    {
                        Ok(())
                    }
                    _ => Err(HistoryError::OrphanToolResult(id.to_string())),
                }
            }
        }
    }
}
