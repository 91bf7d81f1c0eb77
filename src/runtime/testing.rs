//! Mock implementations for testing
//!
//! These mocks let the executor run real turns without a model or tools.

use super::traits::*;
use crate::events::StreamEvent;
use crate::history::Message;
use crate::llm::{DeltaStream, LlmError, MessageDelta, ToolCallFragment, ToolDefinition};
use crate::tools::ToolError;
use async_trait::async_trait;
use futures::stream;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Scripted Model
// ============================================================================

/// What the scripted model does for one round
#[derive(Debug, Clone)]
pub enum Script {
    /// Yield these items, then end the stream
    Deltas(Vec<Result<MessageDelta, LlmError>>),
    /// Fail to open the stream
    OpenError(LlmError),
    /// Open a stream that never yields anything
    Hang,
}

impl Script {
    /// A round that answers with text split into the given chunks
    pub fn text(chunks: &[&str]) -> Self {
        Script::Deltas(chunks.iter().map(|c| Ok(MessageDelta::text(*c))).collect())
    }

    /// A round that requests one tool call per `(id, name, arguments)`
    pub fn tool_calls(calls: &[(&str, &str, &str)]) -> Self {
        Script::Deltas(
            calls
                .iter()
                .enumerate()
                .map(|(index, (id, name, arguments))| {
                    Ok(MessageDelta::fragment(
                        ToolCallFragment::new(u32::try_from(index).unwrap_or(u32::MAX))
                            .with_id(*id)
                            .with_name(*name)
                            .with_arguments(*arguments),
                    ))
                })
                .collect(),
        )
    }
}

/// Model that plays back scripted rounds in order
pub struct ScriptedModel {
    rounds: Mutex<VecDeque<Script>>,
    /// Played once the queue is empty
    fallback: Option<Script>,
    /// History snapshot handed over on each request
    pub requests: Mutex<Vec<Vec<Message>>>,
    /// Notified each time a stream is opened
    pub opened: Arc<Notify>,
}

impl ScriptedModel {
    pub fn new(rounds: Vec<Script>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            opened: Arc::default(),
        }
    }

    /// Play the same round forever
    pub fn always(round: Script) -> Self {
        Self {
            rounds: Mutex::new(VecDeque::new()),
            fallback: Some(round),
            requests: Mutex::new(Vec::new()),
            opened: Arc::default(),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn recorded_requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelStream for ScriptedModel {
    async fn stream(
        &self,
        messages: Vec<Message>,
        _cancel: CancellationToken,
    ) -> Result<DeltaStream, LlmError> {
        self.requests.lock().unwrap().push(messages);
        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Script::OpenError(LlmError::unknown("no scripted round left")));
        self.opened.notify_one();

        match round {
            Script::Deltas(items) => Ok(Box::pin(stream::iter(items))),
            Script::OpenError(error) => Err(error),
            Script::Hang => Ok(Box::pin(stream::pending::<Result<MessageDelta, LlmError>>())),
        }
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }
}

// ============================================================================
// Mock Dispatcher
// ============================================================================

#[derive(Debug, Clone)]
enum MockBehavior {
    Output(String),
    Failure(String),
    /// Signal `started`, then wait for cancellation
    Block,
    /// Cancel the turn's token, then succeed anyway
    CancelThenOutput(CancellationToken, String),
}

/// Dispatcher with canned tool behaviors
#[derive(Default)]
pub struct MockDispatcher {
    tools: HashMap<String, MockBehavior>,
    /// `(name, arguments)` of every invocation, in order
    pub invocations: Mutex<Vec<(String, String)>>,
    /// Notified when a blocking tool starts
    pub started: Arc<Notify>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output(mut self, name: &str, output: &str) -> Self {
        self.tools
            .insert(name.to_string(), MockBehavior::Output(output.to_string()));
        self
    }

    #[must_use]
    pub fn with_failure(mut self, name: &str, reason: &str) -> Self {
        self.tools
            .insert(name.to_string(), MockBehavior::Failure(reason.to_string()));
        self
    }

    #[must_use]
    pub fn with_blocking(mut self, name: &str) -> Self {
        self.tools.insert(name.to_string(), MockBehavior::Block);
        self
    }

    /// Tool that cancels `turn` as it finishes successfully
    #[must_use]
    pub fn with_cancel_then_output(
        mut self,
        name: &str,
        turn: &CancellationToken,
        output: &str,
    ) -> Self {
        self.tools.insert(
            name.to_string(),
            MockBehavior::CancelThenOutput(turn.clone(), output.to_string()),
        );
        self
    }

    pub fn invoked_names(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ToolDispatcher for MockDispatcher {
    fn resolve(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: &str,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.to_string()));

        match self.tools.get(name).cloned() {
            Some(MockBehavior::Output(output)) => Ok(output),
            Some(MockBehavior::Failure(reason)) => Err(ToolError::Failed(reason)),
            Some(MockBehavior::Block) => {
                self.started.notify_one();
                cancel.cancelled().await;
                Err(ToolError::Cancelled)
            }
            Some(MockBehavior::CancelThenOutput(turn, output)) => {
                turn.cancel();
                Ok(output)
            }
            None => Err(ToolError::Failed(format!("tool '{name}' does not exist"))),
        }
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| ToolDefinition {
                name: name.clone(),
                description: format!("Mock tool {name}"),
                input_schema: json!({"type": "object"}),
            })
            .collect()
    }
}

// ============================================================================
// Recording Sink
// ============================================================================

/// Sink that keeps every event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events other than content deltas
    pub fn milestones(&self) -> Vec<StreamEvent> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, StreamEvent::ContentDelta { .. }))
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: StreamEvent) {
        self.events.lock().unwrap().push(event);
    }
}
