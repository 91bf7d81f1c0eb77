//! Engine configuration
//!
//! Defaults suit interactive use; every knob can be overridden from the
//! environment. Unparseable values are logged and replaced with the default
//! rather than aborting startup.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_DISPLAY_TRUNCATION: usize = 500;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// What to do when a tool call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolFailurePolicy {
    /// Record the failure as the call's result and let the model react
    #[default]
    FeedBack,
    /// Record the failure, then end the turn with an error
    AbortTurn,
}

impl FromStr for ToolFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed_back" | "feedback" => Ok(Self::FeedBack),
            "abort_turn" | "abort" => Ok(Self::AbortTurn),
            other => Err(format!("unknown tool failure policy: {other}")),
        }
    }
}

impl fmt::Display for ToolFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeedBack => f.write_str("feed_back"),
            Self::AbortTurn => f.write_str("abort_turn"),
        }
    }
}

/// Per-engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on model rounds per turn
    pub max_iterations: u32,
    /// Characters of tool output shown in events; history keeps the full text
    pub display_truncation: usize,
    pub failure_policy: ToolFailurePolicy,
    /// `None` lets tools run until they finish or the turn is cancelled
    pub tool_timeout: Option<Duration>,
    /// Seeded as the first history message when set
    pub system_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            display_truncation: DEFAULT_DISPLAY_TRUNCATION,
            failure_policy: ToolFailurePolicy::default(),
            tool_timeout: Some(DEFAULT_TOOL_TIMEOUT),
            system_prompt: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let tool_timeout = match parse_var::<u64>(&lookup, "TURNLOOP_TOOL_TIMEOUT_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.tool_timeout,
        };

        Self {
            max_iterations: parse_var(&lookup, "TURNLOOP_MAX_ITERATIONS")
                .unwrap_or(defaults.max_iterations),
            display_truncation: parse_var(&lookup, "TURNLOOP_DISPLAY_TRUNCATION")
                .unwrap_or(defaults.display_truncation),
            failure_policy: parse_var(&lookup, "TURNLOOP_TOOL_FAILURE_POLICY")
                .unwrap_or(defaults.failure_policy),
            tool_timeout,
            system_prompt: lookup("TURNLOOP_SYSTEM_PROMPT").filter(|p| !p.trim().is_empty()),
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: ToolFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Ignoring invalid config value");
            None
        }
    }
}
