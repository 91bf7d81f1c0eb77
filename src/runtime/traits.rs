//! Trait abstractions for runtime I/O
//!
//! The executor only talks to the outside world through these seams, which
//! lets tests drive it with scripted models and mock tools.

pub use crate::events::EventSink;
pub use crate::llm::ModelStream;

use crate::llm::ToolDefinition;
use crate::tools::ToolError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Resolves tool names and runs tools
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Whether a tool with this name exists
    fn resolve(&self, name: &str) -> bool;

    /// Run a tool with its raw arguments
    ///
    /// Implementations should return promptly once `cancel` fires.
    async fn invoke(
        &self,
        name: &str,
        arguments: &str,
        cancel: CancellationToken,
    ) -> Result<String, ToolError>;

    /// Tool definitions to advertise to the model
    fn definitions(&self) -> Vec<ToolDefinition>;
}

#[async_trait]
impl<T: ToolDispatcher + ?Sized> ToolDispatcher for Arc<T> {
    fn resolve(&self, name: &str) -> bool {
        (**self).resolve(name)
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: &str,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        (**self).invoke(name, arguments, cancel).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }
}
