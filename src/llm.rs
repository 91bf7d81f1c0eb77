//! Model stream abstraction
//!
//! Adapters turn a message history into a stream of incremental deltas. The
//! engine consumes deltas without knowing which provider produced them.

mod accumulator;
mod error;
mod openai;
mod types;

pub use accumulator::ToolCallAccumulator;
pub use error::{LlmError, LlmErrorKind};
pub use openai::{OpenAiConfig, OpenAiStream};
pub use types::*;

use crate::history::Message;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Streaming model adapter
#[async_trait]
pub trait ModelStream: Send + Sync {
    /// Open a stream over the given history
    ///
    /// Failing to open is reported as `Err`; failures after opening arrive as
    /// `Err` items on the stream. Adapters should stop promptly once `cancel`
    /// fires.
    async fn stream(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, LlmError>;

    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: ModelStream + ?Sized> ModelStream for Arc<T> {
    async fn stream(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, LlmError> {
        (**self).stream(messages, cancel).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for model adapters
pub struct LoggingStream<M> {
    inner: M,
}

impl<M: ModelStream> LoggingStream<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<M: ModelStream> ModelStream for LoggingStream<M> {
    async fn stream(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, LlmError> {
        let start = Instant::now();
        let message_count = messages.len();
        let model = self.inner.model_id().to_string();

        match self.inner.stream(messages, cancel).await {
            Ok(stream) => {
                tracing::info!(
                    model = %model,
                    messages = message_count,
                    open_ms = %start.elapsed().as_millis(),
                    "Model stream opened"
                );
                let stream = stream.inspect(move |item| {
                    if let Err(e) = item {
                        tracing::error!(
                            model = %model,
                            elapsed_ms = %start.elapsed().as_millis(),
                            error = %e.message,
                            retryable = e.kind.is_retryable(),
                            "Model stream failed"
                        );
                    }
                });
                Ok(Box::pin(stream))
            }
            Err(e) => {
                tracing::error!(
                    model = %model,
                    open_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Model stream failed to open"
                );
                Err(e)
            }
        }
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
