//! Pure state transition function

use super::{Effect, Event, TurnErrorKind, TurnState};
use crate::config::{EngineConfig, ToolFailurePolicy};
use crate::events::{truncate_for_display, StreamEvent};
use crate::history::{Message, ToolCall, ToolResult};
use thiserror::Error;

pub const ITERATION_LIMIT_REASON: &str = "iteration limit reached";
pub const CANCELLED_REASON: &str = "cancelled";

/// Result of a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Emits this result would push to the sink, in order
    pub fn emitted(&self) -> impl Iterator<Item = &StreamEvent> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Emit(event) => Some(event),
            _ => None,
        })
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A turn is already in progress")]
    AgentBusy,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same state, config and event this always produces the same
/// result. All I/O is described by the returned effects.
pub fn transition(
    state: &TurnState,
    config: &EngineConfig,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Turn start
        // ============================================================
        (TurnState::Idle | TurnState::Done { .. } | TurnState::Error { .. }, Event::UserMessage { text }) => {
            let appended = vec![Effect::Append(Message::user(text))];
            Ok(next_round(0, config, appended))
        }

        (TurnState::Streaming { .. } | TurnState::Dispatching { .. }, Event::UserMessage { .. }) => {
            Err(TransitionError::AgentBusy)
        }

        // ============================================================
        // Stream results
        // ============================================================
        (TurnState::Streaming { iteration }, Event::StreamCompleted { content, tool_calls }) => {
            let iteration = *iteration;
            let mut calls = tool_calls.clone().into_iter();
            match calls.next() {
                None => Ok(TransitionResult::new(TurnState::Done { iteration })
                    .with_effect(Effect::Append(Message::assistant(content.clone(), vec![])))
                    .with_effect(Effect::Emit(StreamEvent::TurnDone { content }))),
                Some(first) => Ok(TransitionResult::new(TurnState::Dispatching {
                    iteration,
                    current: first.clone(),
                    remaining: calls.collect(),
                })
                .with_effect(Effect::Append(Message::assistant(content, tool_calls)))
                .with_effects(start_tool(first))),
            }
        }

        // The partial assistant message is discarded
        (TurnState::Streaming { iteration }, Event::StreamFailed { error }) => Ok(fail(
            *iteration,
            TurnErrorKind::ModelStream(error.kind),
            error.message,
            vec![],
        )),

        // ============================================================
        // Tool results
        // ============================================================
        (
            TurnState::Dispatching {
                iteration,
                current,
                remaining,
            },
            Event::ToolCompleted { result },
        ) => {
            if result.tool_call_id != current.id {
                return Err(TransitionError::InvalidTransition(format!(
                    "result for {} while waiting on {}",
                    result.tool_call_id, current.id
                )));
            }

            let mut effects = vec![
                Effect::Append(Message::tool(&result)),
                Effect::Emit(tool_event(current, &result, config.display_truncation)),
            ];

            if result.is_failure() && config.failure_policy == ToolFailurePolicy::AbortTurn {
                effects.extend(
                    remaining
                        .iter()
                        .map(|call| Effect::Append(Message::tool(&ToolResult::failure(&call.id, "skipped")))),
                );
                let reason = format!("tool '{}' failed: {}", current.name, result.text());
                return Ok(fail(*iteration, TurnErrorKind::ToolFailure, reason, effects));
            }

            match remaining.split_first() {
                Some((next, rest)) => Ok(TransitionResult::new(TurnState::Dispatching {
                    iteration: *iteration,
                    current: next.clone(),
                    remaining: rest.to_vec(),
                })
                .with_effects(effects)
                .with_effects(start_tool(next.clone()))),
                None => Ok(next_round(*iteration, config, effects)),
            }
        }

        // ============================================================
        // Cancellation and internal failures
        // ============================================================
        (TurnState::Streaming { iteration }, Event::Cancelled) => Ok(fail(
            *iteration,
            TurnErrorKind::Cancelled,
            CANCELLED_REASON.to_string(),
            vec![],
        )),

        // Every requested call still gets a result so the history stays valid
        (
            TurnState::Dispatching {
                iteration,
                current,
                remaining,
            },
            Event::Cancelled,
        ) => {
            let effects = std::iter::once(current)
                .chain(remaining)
                .map(|call| Effect::Append(Message::tool(&ToolResult::failure(&call.id, CANCELLED_REASON))))
                .collect();
            Ok(fail(
                *iteration,
                TurnErrorKind::Cancelled,
                CANCELLED_REASON.to_string(),
                effects,
            ))
        }

        (
            TurnState::Streaming { iteration } | TurnState::Dispatching { iteration, .. },
            Event::InternalError { message },
        ) => Ok(fail(*iteration, TurnErrorKind::Internal, message, vec![])),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {}",
            state.status()
        ))),
    }
}

/// Start another model round, or stop if the turn has used its budget
fn next_round(iteration: u32, config: &EngineConfig, effects: Vec<Effect>) -> TransitionResult {
    if iteration >= config.max_iterations {
        return fail(
            iteration,
            TurnErrorKind::IterationLimit,
            ITERATION_LIMIT_REASON.to_string(),
            effects,
        );
    }
    TransitionResult::new(TurnState::Streaming {
        iteration: iteration + 1,
    })
    .with_effects(effects)
    .with_effect(Effect::RequestStream)
}

fn fail(iteration: u32, kind: TurnErrorKind, message: String, effects: Vec<Effect>) -> TransitionResult {
    TransitionResult::new(TurnState::Error {
        iteration,
        message: message.clone(),
        kind,
    })
    .with_effects(effects)
    .with_effect(Effect::turn_error(message))
}

fn start_tool(call: ToolCall) -> [Effect; 2] {
    [Effect::tool_invoked(&call), Effect::InvokeTool { call }]
}

fn tool_event(call: &ToolCall, result: &ToolResult, max_chars: usize) -> StreamEvent {
    let text = truncate_for_display(result.text(), max_chars);
    if result.is_failure() {
        StreamEvent::ToolFailed {
            name: call.name.clone(),
            reason: text,
        }
    } else {
        StreamEvent::ToolCompleted {
            name: call.name.clone(),
            result: text,
        }
    }
}
