//! Configurable shell command tool
//!
//! Runs a command template through `sh -c`. `{{param}}` placeholders are
//! replaced with shell-quoted argument values in one pass over the template,
//! so arguments can never inject extra shell syntax.

use super::template::{self, TemplateParam};
use super::{Tool, ToolError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_OUTPUT_CHARS: usize = 64 * 1024;

/// Shell command exposed to the model as a tool
#[derive(Debug, Clone)]
pub struct CommandTool {
    name: String,
    description: String,
    template: String,
    params: Vec<TemplateParam>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandTool {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        let name = name.into();
        let template = template.into();
        Self {
            description: format!("Run `{template}`"),
            name,
            template,
            params: Vec::new(),
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_param(mut self, param: TemplateParam) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fill in the template from the call's arguments
    fn render(&self, input: &Map<String, Value>) -> Result<String, ToolError> {
        let values = template::param_values(&self.params, input)?;
        Ok(template::render(&self.template, &values, shell_quote))
    }
}

/// Single-quote a value for `sh`
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(stderr));
    if combined.chars().count() > MAX_OUTPUT_CHARS {
        let mut cut: String = combined.chars().take(MAX_OUTPUT_CHARS).collect();
        cut.push_str("\n[output truncated]");
        return cut;
    }
    combined
}

#[async_trait]
impl Tool for CommandTool {
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
        let Value::Object(args) = input else {
            return Err(ToolError::InvalidInput("arguments must be an object".to_string()));
        };
        let command = self.render(&args)?;

        let mut cmd = Command::new("sh");
        cmd.args(["-c", &command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| ToolError::Failed(format!("failed to spawn process: {e}")))?;

        tracing::debug!(tool = %self.name, pid = ?child.id(), "Spawned command");

        // Dropping the child on cancel or timeout kills it
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ToolError::Cancelled),
            () = tokio::time::sleep(self.timeout) => Err(ToolError::Timeout(self.timeout)),
            result = child.wait_with_output() => {
                let output = result
                    .map_err(|e| ToolError::Failed(format!("command execution failed: {e}")))?;
                let combined = combine_output(&output.stdout, &output.stderr);
                if output.status.success() {
                    Ok(combined)
                } else {
                    let code = output.status.code().unwrap_or(-1);
                    Err(ToolError::Failed(format!("exit code {code}: {combined}")))
                }
            }
        }
    }
}
