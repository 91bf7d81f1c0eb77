//! Property-based tests for the state machine
//!
//! A whole turn is driven through the pure transition function with a
//! simulated model and tools, then checked against the turn invariants.

use super::*;
use crate::config::{EngineConfig, ToolFailurePolicy};
use crate::events::StreamEvent;
use crate::history::{Message, MessageHistory, Role, ToolCall, ToolResult};
use crate::llm::{LlmError, LlmErrorKind};
use proptest::prelude::*;
use std::collections::VecDeque;

// ============================================================================
// Simulated turn
// ============================================================================

/// What the simulated model does in one round
#[derive(Debug, Clone)]
enum Round {
    Fail(LlmErrorKind),
    /// One entry per requested tool; `true` means the tool fails
    Tools(Vec<bool>),
    Answer,
}

struct Outcome {
    state: TurnState,
    history: MessageHistory,
    events: Vec<StreamEvent>,
    requests: u32,
}

fn drive(config: &EngineConfig, rounds: &[Round], cancel_at: Option<usize>) -> Outcome {
    let mut state = TurnState::Idle;
    let mut history = MessageHistory::new();
    let mut events = Vec::new();
    let mut requests = 0u32;
    let mut pending = VecDeque::from([Event::UserMessage {
        text: "go".to_string(),
    }]);
    let mut failing = std::collections::HashMap::new();
    let mut step = 0usize;

    while let Some(mut event) = pending.pop_front() {
        if cancel_at == Some(step) && state.is_busy() {
            event = Event::Cancelled;
        }
        step += 1;

        let result = transition(&state, config, event).expect("transition rejected a valid event");
        state = result.new_state;

        for effect in result.effects {
            match effect {
                Effect::Append(message) => history.append(message).expect("history invariant broken"),
                Effect::Emit(event) => events.push(event),
                Effect::RequestStream => {
                    let round = rounds
                        .get(requests as usize)
                        .cloned()
                        .unwrap_or(Round::Answer);
                    requests += 1;
                    pending.push_back(match round {
                        Round::Fail(kind) => Event::StreamFailed {
                            error: LlmError::new(kind, "stream broke"),
                        },
                        Round::Answer => Event::StreamCompleted {
                            content: "final".to_string(),
                            tool_calls: vec![],
                        },
                        Round::Tools(fails) => {
                            let tool_calls = fails
                                .iter()
                                .enumerate()
                                .map(|(i, fails)| {
                                    let id = format!("r{requests}_t{i}");
                                    failing.insert(id.clone(), *fails);
                                    ToolCall::new(id, "tool", "{}")
                                })
                                .collect();
                            Event::StreamCompleted {
                                content: String::new(),
                                tool_calls,
                            }
                        }
                    });
                }
                Effect::InvokeTool { call } => {
                    let result = if failing.get(&call.id).copied().unwrap_or(false) {
                        ToolResult::failure(call.id, "boom")
                    } else {
                        ToolResult::output(call.id, "ok")
                    };
                    pending.push_back(Event::ToolCompleted { result });
                }
            }
        }
    }

    Outcome {
        state,
        history,
        events,
        requests,
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_error_kind() -> impl Strategy<Value = LlmErrorKind> {
    prop_oneof![
        Just(LlmErrorKind::Network),
        Just(LlmErrorKind::RateLimit),
        Just(LlmErrorKind::ServerError),
        Just(LlmErrorKind::MalformedStream),
    ]
}

fn arb_round() -> impl Strategy<Value = Round> {
    prop_oneof![
        1 => arb_error_kind().prop_map(Round::Fail),
        6 => prop::collection::vec(prop::bool::weighted(0.2), 1..4).prop_map(Round::Tools),
        2 => Just(Round::Answer),
    ]
}

fn arb_policy() -> impl Strategy<Value = ToolFailurePolicy> {
    prop_oneof![Just(ToolFailurePolicy::FeedBack), Just(ToolFailurePolicy::AbortTurn)]
}

fn arb_config() -> impl Strategy<Value = EngineConfig> {
    (0u32..6, arb_policy()).prop_map(|(max, policy)| {
        EngineConfig::default()
            .with_max_iterations(max)
            .with_failure_policy(policy)
    })
}

fn arb_tool_call() -> impl Strategy<Value = ToolCall> {
    ("[a-z]{8}", "[a-z_]{1,12}").prop_map(|(id, name)| ToolCall::new(id, name, "{}"))
}

fn arb_state() -> impl Strategy<Value = TurnState> {
    prop_oneof![
        Just(TurnState::Idle),
        (1u32..10).prop_map(|iteration| TurnState::Streaming { iteration }),
        (1u32..10, arb_tool_call(), prop::collection::vec(arb_tool_call(), 0..3)).prop_map(
            |(iteration, current, remaining)| TurnState::Dispatching {
                iteration,
                current,
                remaining,
            }
        ),
        (1u32..10).prop_map(|iteration| TurnState::Done { iteration }),
        (1u32..10).prop_map(|iteration| TurnState::Error {
            iteration,
            message: "x".to_string(),
            kind: TurnErrorKind::Internal,
        }),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-z ]{0,20}".prop_map(|text| Event::UserMessage { text }),
        ("[a-z ]{0,20}", prop::collection::vec(arb_tool_call(), 0..3))
            .prop_map(|(content, tool_calls)| Event::StreamCompleted { content, tool_calls }),
        arb_error_kind().prop_map(|kind| Event::StreamFailed {
            error: LlmError::new(kind, "broken"),
        }),
        ("[a-z]{8}", any::<bool>()).prop_map(|(id, failed)| Event::ToolCompleted {
            result: if failed {
                ToolResult::failure(id, "boom")
            } else {
                ToolResult::output(id, "ok")
            },
        }),
        Just(Event::Cancelled),
        Just(Event::InternalError {
            message: "oops".to_string()
        }),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_turn_ends_with_exactly_one_terminal_event(
        config in arb_config(),
        rounds in prop::collection::vec(arb_round(), 0..8),
        cancel_at in prop::option::of(0usize..20),
    ) {
        let outcome = drive(&config, &rounds, cancel_at);

        prop_assert!(outcome.state.is_terminal());
        let terminal: Vec<_> = outcome.events.iter().filter(|e| e.is_terminal()).collect();
        prop_assert_eq!(terminal.len(), 1);
        prop_assert!(outcome.events.last().is_some_and(StreamEvent::is_terminal));
    }

    #[test]
    fn prop_rounds_bounded_by_budget(
        config in arb_config(),
        rounds in prop::collection::vec(arb_round(), 0..8),
    ) {
        let outcome = drive(&config, &rounds, None);

        prop_assert!(outcome.state.iteration() <= config.max_iterations);
        prop_assert_eq!(outcome.requests, outcome.state.iteration());
        if let TurnState::Done { iteration } = outcome.state {
            prop_assert_eq!(outcome.history.count(Role::Assistant) as u32, iteration);
        }
    }

    #[test]
    fn prop_every_invoked_tool_reports_back(
        config in arb_config(),
        rounds in prop::collection::vec(arb_round(), 0..8),
    ) {
        let outcome = drive(&config, &rounds, None);

        let invoked = outcome.events.iter().filter(|e| matches!(e, StreamEvent::ToolInvoked { .. })).count();
        let reported = outcome
            .events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ToolCompleted { .. } | StreamEvent::ToolFailed { .. }))
            .count();
        prop_assert_eq!(invoked, reported);
    }

    #[test]
    fn prop_every_requested_call_is_answered(
        config in arb_config(),
        rounds in prop::collection::vec(arb_round(), 0..8),
        cancel_at in prop::option::of(0usize..20),
    ) {
        let outcome = drive(&config, &rounds, cancel_at);

        let requested: Vec<&str> = outcome
            .history
            .messages()
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
            .collect();
        let answered: Vec<&str> = outcome
            .history
            .messages()
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        prop_assert_eq!(requested, answered);
    }

    #[test]
    fn prop_transition_is_deterministic(state in arb_state(), event in arb_event()) {
        let config = EngineConfig::default();
        let first = transition(&state, &config, event.clone());
        let second = transition(&state, &config, event);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_busy_states_reject_user_messages(state in arb_state(), text in "[a-z]{0,10}") {
        let result = transition(&state, &EngineConfig::default(), Event::UserMessage { text });
        if state.is_busy() {
            prop_assert_eq!(result, Err(TransitionError::AgentBusy));
        } else {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn prop_terminal_transitions_emit_turn_end(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &EngineConfig::default(), event) {
            let ends_turn = result.emitted().any(StreamEvent::is_terminal);
            prop_assert_eq!(ends_turn, result.new_state.is_terminal());
        }
    }
}

#[test]
fn test_user_message_is_first_append() {
    let outcome = drive(&EngineConfig::default(), &[Round::Answer], None);
    assert_eq!(outcome.history.messages()[0], Message::user("go"));
    assert_eq!(outcome.state, TurnState::Done { iteration: 1 });
}
