//! `OpenAI`-compatible chat completions streaming adapter

use super::types::{DeltaStream, MessageDelta, ToolCallFragment, ToolDefinition};
use super::{LlmError, ModelStream};
use crate::history::{Message, Role};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Connection settings for an `OpenAI`-compatible endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
}

impl OpenAiConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `DEFAULT_MODEL`
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_key = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty())?;
        let base_url = lookup("OPENAI_BASE_URL")
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = lookup("DEFAULT_MODEL")
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Some(Self {
            api_key,
            base_url,
            model,
            max_tokens: None,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Streams chat completions from an `OpenAI`-compatible server
pub struct OpenAiStream {
    client: Client,
    config: OpenAiConfig,
    tools: Vec<ToolDefinition>,
}

impl OpenAiStream {
    pub fn new(config: OpenAiConfig, tools: Vec<ToolDefinition>) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            tools,
        })
    }

    fn translate_request(&self, messages: &[Message]) -> ChatRequest {
        let tools = if self.tools.is_empty() {
            None
        } else {
            Some(
                self.tools
                    .iter()
                    .map(|t| ChatTool {
                        r#type: "function".to_string(),
                        function: ChatFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        ChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(translate_message).collect(),
            tools,
            max_tokens: self.config.max_tokens,
            stream: true,
        }
    }
}

fn translate_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| ChatToolCall {
                    id: call.id.clone(),
                    r#type: "function".to_string(),
                    function: ChatFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        )
    };

    // Assistant messages that only carry tool calls send null content
    let content = if message.content.is_empty() && tool_calls.is_some() {
        None
    } else {
        Some(message.content.clone())
    };

    ChatMessage {
        role: role.to_string(),
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn classify_send_error(e: &reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::network(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        LlmError::network(format!("Connection failed: {e}"))
    } else {
        LlmError::unknown(format!("Request failed: {e}"))
    }
}

#[async_trait]
impl ModelStream for OpenAiStream {
    async fn stream(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, LlmError> {
        let request = self.translate_request(&messages);

        let send = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(LlmError::network("Request cancelled"));
            }
            result = send => result.map_err(|e| classify_send_error(&e))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        Ok(sse_deltas(body))
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// Server-sent events
// ============================================================================

/// Incremental decoder for `data:` lines of an SSE body
///
/// Bytes are buffered until a full line arrives, so chunk boundaries that
/// split a line or a multi-byte character are harmless.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Result<Vec<MessageDelta>, LlmError> {
        self.buffer.extend_from_slice(bytes);
        let mut deltas = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(delta) = self.decode_line(&line)? {
                deltas.push(delta);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }

        Ok(deltas)
    }

    /// Handle a trailing line without a newline once the body ends
    pub(crate) fn finish(&mut self) -> Result<Option<MessageDelta>, LlmError> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        self.decode_line(&rest)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    fn decode_line(&mut self, line: &[u8]) -> Result<Option<MessageDelta>, LlmError> {
        let line = std::str::from_utf8(line)
            .map_err(|e| LlmError::malformed_stream(format!("Invalid UTF-8 in stream: {e}")))?
            .trim();

        let Some(data) = line.strip_prefix("data:") else {
            // Comments, event names and blank separators carry no payload
            return Ok(None);
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let chunk: StreamChunk = serde_json::from_str(data)
            .map_err(|e| LlmError::malformed_stream(format!("Invalid stream chunk: {e}")))?;
        if let Some(error) = chunk.error {
            return Err(LlmError::server_error(error.message));
        }

        let mut delta = MessageDelta::default();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                delta.content.push_str(&content);
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                delta.tool_call_fragments.push(ToolCallFragment {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments,
                });
            }
        }

        Ok((!delta.is_empty()).then_some(delta))
    }
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<MessageDelta, LlmError>>,
    finished: bool,
}

fn sse_deltas(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> DeltaStream {
    let state = SseState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => match state.decoder.push(&bytes) {
                    Ok(deltas) => {
                        state.pending.extend(deltas.into_iter().map(Ok));
                        state.finished = state.decoder.is_done();
                    }
                    Err(e) => {
                        state.pending.push_back(Err(e));
                        state.finished = true;
                    }
                },
                Some(Err(e)) => {
                    state.finished = true;
                    state
                        .pending
                        .push_back(Err(LlmError::network(format!("Stream interrupted: {e}"))));
                }
                None => {
                    state.finished = true;
                    match state.decoder.finish() {
                        Ok(Some(delta)) => state.pending.push_back(Ok(delta)),
                        Ok(None) => {}
                        Err(e) => state.pending.push_back(Err(e)),
                    }
                }
            }
        }
    }))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    r#type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatToolCall {
    id: String,
    r#type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}
