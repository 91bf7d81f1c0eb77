//! Streaming types shared by model adapters and the engine

use super::LlmError;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Incremental output from a model stream
///
/// The stream ends when it yields `None`; there is no separate end marker.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<MessageDelta, LlmError>> + Send>>;

/// One chunk of streamed model output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDelta {
    pub content: String,
    pub tool_call_fragments: Vec<ToolCallFragment>,
}

impl MessageDelta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_call_fragments: Vec::new(),
        }
    }

    pub fn fragment(fragment: ToolCallFragment) -> Self {
        Self {
            content: String::new(),
            tool_call_fragments: vec![fragment],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.tool_call_fragments.is_empty()
    }
}

/// Partial tool call data; the accumulator stitches fragments together by index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}
