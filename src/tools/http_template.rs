//! Configurable HTTP endpoint tool
//!
//! URL, header and body templates take `{{param}}` placeholders filled from
//! the call's arguments. Values land in the URL percent-encoded and in
//! headers and body verbatim.

use super::http_request::truncate_body;
use super::template::{self, TemplateParam};
use super::{Tool, ToolError};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::fmt::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A fixed HTTP endpoint exposed to the model as a tool
#[derive(Debug, Clone)]
pub struct HttpTemplateTool {
    name: String,
    description: String,
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Option<String>,
    params: Vec<TemplateParam>,
    timeout: Duration,
    client: Client,
}

impl HttpTemplateTool {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: name.into(),
            description: format!("Call {url}"),
            url,
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            params: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            client: Client::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Header whose value is a template
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, param: TemplateParam) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn build_request(&self, input: &Value) -> Result<reqwest::RequestBuilder, ToolError> {
        let Value::Object(args) = input else {
            return Err(ToolError::InvalidInput("arguments must be an object".to_string()));
        };
        let values = template::param_values(&self.params, args)?;

        let url = template::render(&self.url, &values, encode_component);
        let mut request = self
            .client
            .request(self.method.clone(), url)
            .timeout(self.timeout);
        for (name, value) in &self.headers {
            request = request.header(name, template::render(value, &values, str::to_string));
        }
        if let Some(body) = &self.body {
            request = request.body(template::render(body, &values, str::to_string));
        }
        Ok(request)
    }
}

/// Percent-encode everything outside the URL unreserved set
fn encode_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}

#[async_trait]
impl Tool for HttpTemplateTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn input_schema(&self) -> Value {
        template::params_schema(&self.params)
    }

    async fn run(&self, input: Value, cancel: CancellationToken) -> Result<String, ToolError> {
        let request = self.build_request(&input)?;

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

        tracing::debug!(tool = %self.name, status = status.as_u16(), "HTTP tool response");
        if status.is_client_error() || status.is_server_error() {
            return Err(ToolError::Failed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_body(&body)
            )));
        }
        Ok(truncate_body(&body))
    }
}
