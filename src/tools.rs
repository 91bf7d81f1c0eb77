//! Tool implementations and the registry that dispatches to them
//!
//! Tools are stateless singletons. The registry parses raw call arguments
//! into JSON before handing them to a tool.

mod command;
mod http_request;
mod http_template;
mod template;
mod think;

pub use command::CommandTool;
pub use http_request::HttpRequestTool;
pub use http_template::HttpTemplateTool;
pub use template::TemplateParam;
pub use think::ThinkTool;

use crate::llm::ToolDefinition;
use crate::runtime::ToolDispatcher;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a tool call did not produce output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("cancelled")]
    Cancelled,
    #[error("tool timed out after {0:?}")]
    Timeout(Duration),
}

/// Trait for tools the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Run the tool
    ///
    /// Tools that spawn long-running work should watch `cancel` and stop
    /// promptly when it fires.
    async fn run(&self, input: Value, cancel: CancellationToken) -> Result<String, ToolError>;
}

/// Collection of tools available to conversations
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tools
    pub fn standard() -> Self {
        Self::new()
            .with_tool(ThinkTool)
            .with_tool(HttpRequestTool::new())
    }

    /// Add a tool; a later tool with the same name shadows an earlier one
    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

/// Parse raw call arguments; an empty string means no arguments
fn parse_arguments(arguments: &str) -> Result<Value, ToolError> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(arguments).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    fn resolve(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: &str,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::Failed(format!("tool '{name}' does not exist")))?;
        let input = parse_arguments(arguments)?;
        tool.run(input, cancel).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tools_registered() {
        let registry = ToolRegistry::standard();
        let names = registry.names();
        assert!(names.contains(&"think"), "Missing think");
        assert!(names.contains(&"http_request"), "Missing http_request");
        assert_eq!(registry.definitions().len(), names.len());
    }

    #[test]
    fn test_later_registration_shadows() {
        let registry = ToolRegistry::new()
            .with_tool(CommandTool::new("greet", "echo hi"))
            .with_tool(CommandTool::new("greet", "echo hello"));
        assert_eq!(registry.names(), vec!["greet"]);
    }

    #[tokio::test]
    async fn test_invoke_parses_arguments() {
        let registry = ToolRegistry::standard();
        assert!(registry.resolve("think"));
        assert!(!registry.resolve("nonexistent_tool"));

        let err = registry
            .invoke("think", "{not json", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let err = ToolRegistry::new()
            .invoke("ghost", "{}", CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Failed("tool 'ghost' does not exist".to_string()));
    }

    #[test]
    fn test_empty_arguments_are_empty_object() {
        assert_eq!(parse_arguments("  ").unwrap(), serde_json::json!({}));
    }
}
