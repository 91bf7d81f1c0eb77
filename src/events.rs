//! Stream events and the sinks that receive them
//!
//! The engine pushes every user-visible happening of a turn through an
//! [`EventSink`]. Sinks must not block: a slow consumer must never stall the
//! model stream.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Suffix appended to tool output cut down for display
pub const TRUNCATION_SUFFIX: &str = "...(truncated)";

/// Event pushed to the UI during a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ContentDelta { text: String },
    ToolInvoked { name: String, arguments: String },
    ToolCompleted { name: String, result: String },
    ToolFailed { name: String, reason: String },
    TurnError { reason: String },
    TurnDone { content: String },
}

impl StreamEvent {
    /// `TurnDone` and `TurnError` end a turn; exactly one is emitted per turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::TurnDone { .. } | StreamEvent::TurnError { .. })
    }
}

/// Receives stream events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: StreamEvent) {
        (**self).emit(event);
    }
}

// A dropped receiver only means nobody is watching; the turn carries on.
impl EventSink for mpsc::UnboundedSender<StreamEvent> {
    fn emit(&self, event: StreamEvent) {
        let _ = self.send(event);
    }
}

impl EventSink for broadcast::Sender<StreamEvent> {
    fn emit(&self, event: StreamEvent) {
        let _ = self.send(event);
    }
}

/// Fan out to two sinks, in order
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&self, event: StreamEvent) {
        self.0.emit(event.clone());
        self.1.emit(event);
    }
}

/// Stream of events read from a [`channel`]
pub type EventStream = UnboundedReceiverStream<StreamEvent>;

/// Unbounded sink paired with the stream that drains it
pub fn channel() -> (mpsc::UnboundedSender<StreamEvent>, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx))
}

/// Sink that writes events to the tracing subscriber
#[derive(Debug, Clone)]
pub struct TracingSink {
    session_id: String,
}

impl TracingSink {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: StreamEvent) {
        match &event {
            StreamEvent::ContentDelta { text } => {
                tracing::trace!(session_id = %self.session_id, len = text.len(), "Content delta");
            }
            StreamEvent::ToolInvoked { name, .. } => {
                tracing::info!(session_id = %self.session_id, tool = %name, "Tool invoked");
            }
            StreamEvent::ToolCompleted { name, .. } => {
                tracing::info!(session_id = %self.session_id, tool = %name, "Tool completed");
            }
            StreamEvent::ToolFailed { name, reason } => {
                tracing::warn!(session_id = %self.session_id, tool = %name, reason = %reason, "Tool failed");
            }
            StreamEvent::TurnError { reason } => {
                tracing::warn!(session_id = %self.session_id, reason = %reason, "Turn failed");
            }
            StreamEvent::TurnDone { content } => {
                tracing::info!(session_id = %self.session_id, len = content.len(), "Turn done");
            }
        }
    }
}

/// Cut `text` to at most `max_chars` characters for display
///
/// Counts characters rather than bytes so multi-byte text is never split.
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_SUFFIX.len());
            out.extend(text.chars().take(max_chars));
            out.push_str(TRUNCATION_SUFFIX);
            out
        }
    }
}
