//! HTTP request tool

use super::{Tool, ToolError};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_CHARS: usize = 32 * 1024;

/// Makes a single HTTP request and returns the status line and body
pub struct HttpRequestTool {
    client: Client,
}

impl HttpRequestTool {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct HttpRequestInput {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<String>,
}

impl HttpRequestInput {
    fn method(&self) -> Result<Method, ToolError> {
        let method = self.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
        match method.as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "PATCH" => Ok(Method::PATCH),
            "DELETE" => Ok(Method::DELETE),
            "HEAD" => Ok(Method::HEAD),
            other => Err(ToolError::InvalidInput(format!("unsupported method {other}"))),
        }
    }

    fn validate_url(&self) -> Result<(), ToolError> {
        if self.url.starts_with("http://") || self.url.starts_with("https://") {
            Ok(())
        } else {
            Err(ToolError::InvalidInput(format!(
                "url must start with http:// or https:// (got {})",
                self.url
            )))
        }
    }
}

pub(super) fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(MAX_BODY_CHARS).collect();
    cut.push_str("\n[body truncated]");
    cut
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &'static str {
        "http_request"
    }

    fn description(&self) -> String {
        "Make an HTTP request and return the response status and body. Non-2xx responses are \
         reported as failures."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http or https URL"
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"],
                    "description": "HTTP method, GET by default"
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Extra request headers"
                },
                "body": {
                    "type": "string",
                    "description": "Request body"
                }
            }
        })
    }

    async fn run(&self, input: Value, cancel: CancellationToken) -> Result<String, ToolError> {
        let input: HttpRequestInput =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        input.validate_url()?;
        let method = input.method()?;

        let mut request = self
            .client
            .request(method, &input.url)
            .timeout(REQUEST_TIMEOUT);
        for (name, value) in &input.headers {
            request = request.header(name, value);
        }
        if let Some(body) = input.body {
            request = request.body(body);
        }

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| ToolError::Failed(format!("request failed: {e}")))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ToolError::Failed(format!("failed to read body: {e}")))?;
            Ok::<_, ToolError>((status, body))
        };

        let (status, body) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ToolError::Cancelled),
            result = exchange => result?,
        };

        let text = format!("HTTP {}\n{}", status.as_u16(), truncate_body(&body));
        if status.is_success() {
            Ok(text)
        } else {
            Err(ToolError::Failed(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let result = HttpRequestTool::new()
            .run(json!({"url": "file:///etc/passwd"}), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_rejects_unknown_method() {
        let result = HttpRequestTool::new()
            .run(
                json!({"url": "http://localhost", "method": "BREW"}),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(
            result,
            Err(ToolError::InvalidInput("unsupported method BREW".to_string()))
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_response() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        // Unroutable address; cancellation wins before any connect attempt
        let result = HttpRequestTool::new()
            .run(json!({"url": "http://10.255.255.1/"}), cancel)
            .await;
        assert_eq!(result, Err(ToolError::Cancelled));
    }

    #[test]
    fn test_body_truncation() {
        let long = "x".repeat(MAX_BODY_CHARS + 10);
        let cut = truncate_body(&long);
        assert!(cut.ends_with("[body truncated]"));
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn test_method_defaults_to_get() {
        let input: HttpRequestInput = serde_json::from_value(json!({"url": "https://x"})).unwrap();
        assert_eq!(input.method().unwrap(), Method::GET);
    }
}
