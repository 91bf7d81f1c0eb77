//! Runtime for executing conversations
//!
//! A [`ConversationEngine`] owns one conversation's history and runs at most
//! one turn at a time on a background task. [`SessionManager`] keeps many
//! independent conversations side by side.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;


pub use traits::*;

use crate::config::EngineConfig;
use crate::history::{Message, MessageHistory, Role};
use crate::state_machine::{ConversationState, TurnErrorKind, TurnState, TurnStatus};
use executor::TurnWorker;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors surfaced to engine callers
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a turn is already in progress for this conversation")]
    TurnInProgress,
    #[error("turn worker failed: {0}")]
    Worker(String),
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Done {
        content: String,
        iterations: u32,
    },
    Failed {
        kind: TurnErrorKind,
        message: String,
        iterations: u32,
    },
}

impl TurnOutcome {
    pub(crate) fn from_state(state: &TurnState, history: &MessageHistory) -> Self {
        match state {
            TurnState::Error {
                iteration,
                message,
                kind,
            } => TurnOutcome::Failed {
                kind: *kind,
                message: message.clone(),
                iterations: *iteration,
            },
            TurnState::Done { iteration } => TurnOutcome::Done {
                content: history
                    .messages()
                    .last()
                    .filter(|m| m.role == Role::Assistant)
                    .map(|m| m.content.clone())
                    .unwrap_or_default(),
                iterations: *iteration,
            },
            other => TurnOutcome::Failed {
                kind: TurnErrorKind::Internal,
                message: format!("turn stopped while {}", other.status()),
                iterations: other.iteration(),
            },
        }
    }

    pub fn iterations(&self) -> u32 {
        match self {
            TurnOutcome::Done { iterations, .. } | TurnOutcome::Failed { iterations, .. } => {
                *iterations
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TurnOutcome::Done { .. })
    }
}

/// Handle to a running turn
pub struct TurnHandle {
    cancel: CancellationToken,
    join: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Request cancellation; the turn ends with a `TurnError` event
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the turn to end
    pub async fn outcome(self) -> Result<TurnOutcome, EngineError> {
        self.join
            .await
            .map_err(|e| EngineError::Worker(e.to_string()))
    }
}

/// Engine for one conversation
pub struct ConversationEngine<M, D, S> {
    session_id: String,
    model: Arc<M>,
    dispatcher: Arc<D>,
    sink: Arc<S>,
    config: Arc<EngineConfig>,
    /// Held by the running turn; readers never touch it
    turn: Arc<Mutex<()>>,
    state: Arc<Mutex<ConversationState>>,
}

impl<M, D, S> ConversationEngine<M, D, S>
where
    M: ModelStream + 'static,
    D: ToolDispatcher + 'static,
    S: EventSink + 'static,
{
    pub fn new(
        session_id: impl Into<String>,
        model: Arc<M>,
        dispatcher: Arc<D>,
        sink: S,
        config: EngineConfig,
    ) -> Self {
        let state = ConversationState::new(config.system_prompt.as_deref());
        Self {
            session_id: session_id.into(),
            model,
            dispatcher,
            sink: Arc::new(sink),
            config: Arc::new(config),
            turn: Arc::new(Mutex::new(())),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start a turn with the user's text
    ///
    /// Events flow to the engine's sink while the turn runs on a background
    /// task. `cancel` stops the turn at the next suspension point. Fails
    /// without side effects if another turn is still running.
    pub fn submit_turn(
        &self,
        text: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<TurnHandle, EngineError> {
        let turn = Arc::clone(&self.turn)
            .try_lock_owned()
            .map_err(|_| EngineError::TurnInProgress)?;

        let worker = TurnWorker {
            session_id: self.session_id.clone(),
            model: Arc::clone(&self.model),
            dispatcher: Arc::clone(&self.dispatcher),
            sink: Arc::clone(&self.sink),
            config: Arc::clone(&self.config),
            cancel: cancel.clone(),
        };
        let text = text.into();
        let state = Arc::clone(&self.state);
        let join = tokio::spawn(async move { worker.run_guarded(turn, state, text).await });

        Ok(TurnHandle { cancel, join })
    }

    /// Run a turn and wait for it to finish
    pub async fn run_turn(
        &self,
        text: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, EngineError> {
        self.submit_turn(text, cancel)?.outcome().await
    }

    /// Copy of the history; waits for a running turn to finish
    pub async fn history(&self) -> Vec<Message> {
        self.state.lock().await.history.snapshot()
    }

    pub async fn status(&self) -> TurnStatus {
        self.state.lock().await.status.status()
    }

    pub async fn iteration(&self) -> u32 {
        self.state.lock().await.iteration
    }

    /// Whether a turn is running
    pub fn is_busy(&self) -> bool {
        self.turn.try_lock().is_err()
    }
}

/// Independent conversations keyed by session id
pub struct SessionManager<M, D, S> {
    model: Arc<M>,
    dispatcher: Arc<D>,
    config: EngineConfig,
    make_sink: Box<dyn Fn(&str) -> S + Send + Sync>,
    sessions: RwLock<HashMap<String, Arc<ConversationEngine<M, D, S>>>>,
}

impl<M, D, S> SessionManager<M, D, S>
where
    M: ModelStream + 'static,
    D: ToolDispatcher + 'static,
    S: EventSink + 'static,
{
    /// `make_sink` builds the event sink for each new session
    pub fn new(
        model: Arc<M>,
        dispatcher: Arc<D>,
        config: EngineConfig,
        make_sink: impl Fn(&str) -> S + Send + Sync + 'static,
    ) -> Self {
        Self {
            model,
            dispatcher,
            config,
            make_sink: Box::new(make_sink),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Existing session, or a fresh one with empty history
    pub async fn get_or_create(&self, session_id: &str) -> Arc<ConversationEngine<M, D, S>> {
        if let Some(engine) = self.sessions.read().await.get(session_id) {
            return Arc::clone(engine);
        }

        let mut sessions = self.sessions.write().await;
        let engine = sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!(session_id, "Creating session");
            Arc::new(ConversationEngine::new(
                session_id,
                Arc::clone(&self.model),
                Arc::clone(&self.dispatcher),
                (self.make_sink)(session_id),
                self.config.clone(),
            ))
        });
        Arc::clone(engine)
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<ConversationEngine<M, D, S>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Forget a session; a turn already running on it still finishes
    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "Removed session");
        }
        removed
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
