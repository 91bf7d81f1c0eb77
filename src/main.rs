//! turnloop - interactive terminal chat with tool calling
//!
//! Reads user turns from stdin, streams the model's answer to stdout and
//! logs to stderr. Ctrl-C cancels the running turn.

use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnloop::events::{self, EventStream, StreamEvent, TracingSink};
use turnloop::llm::{LoggingStream, OpenAiConfig, OpenAiStream};
use turnloop::runtime::ToolDispatcher;
use turnloop::tools::ToolRegistry;
use turnloop::{ConversationEngine, EngineConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnloop=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Configuration
    let config = EngineConfig::from_env();
    let Some(openai) = OpenAiConfig::from_env() else {
        tracing::error!("No model configured. Set OPENAI_API_KEY (and optionally OPENAI_BASE_URL, DEFAULT_MODEL).");
        return Err("OPENAI_API_KEY is not set".into());
    };

    let tools = Arc::new(ToolRegistry::standard());
    tracing::info!(
        model = %openai.model,
        base_url = %openai.base_url,
        tools = ?tools.names(),
        max_iterations = config.max_iterations,
        failure_policy = %config.failure_policy,
        "Starting turnloop"
    );

    let model = Arc::new(LoggingStream::new(OpenAiStream::new(
        openai,
        tools.definitions(),
    )?));
    let (sink, mut events) = events::channel();
    let session_id = uuid::Uuid::new_v4().to_string();
    let sink = (sink, TracingSink::new(&session_id));
    let engine = ConversationEngine::new(session_id, model, tools, sink, config);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let handle = engine.submit_turn(line, CancellationToken::new())?;
        follow_turn(&mut events, || handle.cancel()).await?;

        let outcome = handle.outcome().await?;
        tracing::debug!(?outcome, "Turn outcome");
    }

    tracing::info!("Goodbye");
    Ok(())
}

/// Print events until the turn ends, cancelling on the first Ctrl-C
async fn follow_turn(
    events: &mut EventStream,
    cancel: impl Fn(),
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { return Ok(()) };
                let terminal = event.is_terminal();
                render(&mut stdout, &event)?;
                if terminal {
                    return Ok(());
                }
            }
            result = tokio::signal::ctrl_c(), if !interrupted => {
                result?;
                interrupted = true;
                cancel();
            }
        }
    }
}

fn render(out: &mut impl Write, event: &StreamEvent) -> std::io::Result<()> {
    match event {
        StreamEvent::ContentDelta { text } => write!(out, "{text}")?,
        StreamEvent::ToolInvoked { name, arguments } => {
            writeln!(out, "\n[tool] {name} {arguments}")?;
        }
        StreamEvent::ToolCompleted { name, result } => writeln!(out, "[tool] {name} -> {result}")?,
        StreamEvent::ToolFailed { name, reason } => writeln!(out, "[tool] {name} failed: {reason}")?,
        StreamEvent::TurnError { reason } => writeln!(out, "\n[error] {reason}")?,
        StreamEvent::TurnDone { .. } => writeln!(out)?,
    }
    out.flush()
}
