//! Turn executor
//!
//! Runs one turn to completion: feeds events through the pure transition
//! function and carries out the resulting effects in order. Each turn holds
//! its conversation's turn guard and state lock for its whole lifetime.

use super::traits::{EventSink, ModelStream, ToolDispatcher};
use super::TurnOutcome;
use crate::config::EngineConfig;
use crate::events::StreamEvent;
use crate::history::{ToolCall, ToolResult};
use crate::llm::ToolCallAccumulator;
use crate::state_machine::{
    transition, ConversationState, Effect, Event, TurnErrorKind, TurnState,
};
use crate::tools::ToolError;
use futures::{FutureExt, StreamExt};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// Everything a single turn needs
pub(crate) struct TurnWorker<M, D, S> {
    pub session_id: String,
    pub model: Arc<M>,
    pub dispatcher: Arc<D>,
    pub sink: Arc<S>,
    pub config: Arc<EngineConfig>,
    pub cancel: CancellationToken,
}

impl<M, D, S> TurnWorker<M, D, S>
where
    M: ModelStream + 'static,
    D: ToolDispatcher + 'static,
    S: EventSink + 'static,
{
    /// Run one turn while holding `turn`
    ///
    /// A panic inside the turn still ends it with a `TurnError`.
    pub async fn run_guarded(
        self,
        turn: OwnedMutexGuard<()>,
        state: Arc<Mutex<ConversationState>>,
        text: String,
    ) -> TurnOutcome {
        let mut state = state.lock_owned().await;
        let outcome = match AssertUnwindSafe(self.run(&mut state, text))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(session_id = %self.session_id, "Turn worker panicked");
                self.abandon(&mut state, "turn worker panicked".to_string());
                TurnOutcome::from_state(&state.status, &state.history)
            }
        };
        drop(state);
        drop(turn);
        outcome
    }

    async fn run(&self, state: &mut ConversationState, text: String) -> TurnOutcome {
        tracing::info!(session_id = %self.session_id, "Starting turn");
        state.iteration = 0;

        let mut pending = VecDeque::from([Event::UserMessage { text }]);

        'events: while let Some(event) = pending.pop_front() {
            let result = match transition(&state.status, &self.config, event) {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(session_id = %self.session_id, error = %e, "Rejected event");
                    if state.status.is_busy() {
                        pending.push_back(Event::InternalError {
                            message: e.to_string(),
                        });
                    }
                    continue;
                }
            };

            tracing::debug!(
                session_id = %self.session_id,
                from = %state.status.status(),
                to = %result.new_state.status(),
                effects = result.effects.len(),
                "Transition"
            );
            state.status = result.new_state;
            state.iteration = state.status.iteration();

            for effect in result.effects {
                match self.execute_effect(state, effect).await {
                    Ok(Some(next)) => pending.push_back(next),
                    Ok(None) => {}
                    Err(message) => {
                        // Effects after a rejected append would describe a
                        // history that no longer exists
                        tracing::error!(session_id = %self.session_id, error = %message, "Effect failed");
                        self.abandon(state, message);
                        break 'events;
                    }
                }
            }
        }

        if !state.status.is_terminal() {
            self.abandon(state, "turn ended without a result".to_string());
        }

        let outcome = TurnOutcome::from_state(&state.status, &state.history);
        tracing::info!(session_id = %self.session_id, ?outcome, "Turn finished");
        outcome
    }

    async fn execute_effect(
        &self,
        state: &mut ConversationState,
        effect: Effect,
    ) -> Result<Option<Event>, String> {
        match effect {
            Effect::Append(message) => {
                state.history.append(message).map_err(|e| e.to_string())?;
                Ok(None)
            }
            Effect::Emit(event) => {
                self.sink.emit(event);
                Ok(None)
            }
            Effect::RequestStream => Ok(Some(self.stream_round(state).await)),
            Effect::InvokeTool { call } => Ok(Some(self.invoke_tool(call).await)),
        }
    }

    /// Consume one model stream, forwarding text as it arrives
    async fn stream_round(&self, state: &ConversationState) -> Event {
        tracing::debug!(session_id = %self.session_id, iteration = state.iteration, "Requesting model stream");
        let messages = state.history.snapshot();

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Event::Cancelled,
            result = self.model.stream(messages, self.cancel.clone()) => result,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(error) => return Event::StreamFailed { error },
        };

        let mut content = String::new();
        let mut calls = ToolCallAccumulator::new();

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Event::Cancelled,
                next = stream.next() => next,
            };

            match next {
                None => break,
                Some(Ok(delta)) => {
                    if !delta.content.is_empty() {
                        content.push_str(&delta.content);
                        self.sink.emit(StreamEvent::ContentDelta {
                            text: delta.content,
                        });
                    }
                    for fragment in delta.tool_call_fragments {
                        calls.observe(fragment);
                    }
                }
                // Partially assembled calls are never executed
                Some(Err(error)) => return Event::StreamFailed { error },
            }
        }

        Event::StreamCompleted {
            content,
            tool_calls: calls.finish(),
        }
    }

    async fn invoke_tool(&self, call: ToolCall) -> Event {
        if self.cancel.is_cancelled() {
            return Event::Cancelled;
        }
        if !self.dispatcher.resolve(&call.name) {
            tracing::warn!(session_id = %self.session_id, tool = %call.name, "Unknown tool");
            let reason = format!("tool '{}' does not exist", call.name);
            return Event::ToolCompleted {
                result: ToolResult::failure(call.id, reason),
            };
        }

        tracing::info!(session_id = %self.session_id, tool = %call.name, id = %call.id, "Executing tool");
        let tool_cancel = self.cancel.child_token();
        let invocation = self
            .dispatcher
            .invoke(&call.name, &call.arguments, tool_cancel.clone());
        let bounded = async {
            match self.config.tool_timeout {
                Some(limit) => match tokio::time::timeout(limit, invocation).await {
                    Ok(result) => result,
                    Err(_) => {
                        tool_cancel.cancel();
                        Err(ToolError::Timeout(limit))
                    }
                },
                None => invocation.await,
            }
        };

        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::info!(session_id = %self.session_id, tool = %call.name, "Tool cancelled");
                return Event::Cancelled;
            }
            outcome = bounded => outcome,
        };

        // The tool may have noticed cancellation before we did. A tool that
        // finished anyway keeps its result; the next effect sees the cancel.
        if self.cancel.is_cancelled() && matches!(outcome, Err(ToolError::Cancelled)) {
            return Event::Cancelled;
        }

        let result = match outcome {
            Ok(output) => ToolResult::output(call.id, output),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, tool = %call.name, error = %e, "Tool failed");
                ToolResult::failure(call.id, e.to_string())
            }
        };
        Event::ToolCompleted { result }
    }

    /// End the turn with an internal error outside the normal transitions
    fn abandon(&self, state: &mut ConversationState, message: String) {
        let iteration = state.status.iteration();
        state.status = TurnState::Error {
            iteration,
            message: message.clone(),
            kind: TurnErrorKind::Internal,
        };
        self.sink.emit(StreamEvent::TurnError { reason: message });
    }
}
