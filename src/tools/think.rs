//! Think tool - lets the model reason step by step without side effects

use super::{Tool, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Sequential thinking tool
pub struct ThinkTool;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThinkInput {
    thought: String,
    thought_number: u32,
    total_thoughts: u32,
    next_thought_needed: bool,
}

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &'static str {
        "think"
    }

    fn description(&self) -> String {
        "Work through a problem one thought at a time. Each call records a single numbered thought; \
         set nextThoughtNeeded to false once the reasoning is complete. Thoughts have no side effects \
         and are not shown to the user."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["thought", "thoughtNumber", "totalThoughts", "nextThoughtNeeded"],
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "The current thinking step"
                },
                "thoughtNumber": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Position of this thought in the sequence"
                },
                "totalThoughts": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Estimated number of thoughts needed"
                },
                "nextThoughtNeeded": {
                    "type": "boolean",
                    "description": "Whether another thought should follow"
                }
            }
        })
    }

    async fn run(&self, input: Value, _cancel: CancellationToken) -> Result<String, ToolError> {
        let input: ThinkInput =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        if input.thought.trim().is_empty() {
            return Err(ToolError::InvalidInput("thought must not be empty".to_string()));
        }
        if input.thought_number == 0 {
            return Err(ToolError::InvalidInput("thoughtNumber starts at 1".to_string()));
        }

        // The model may revise its estimate upwards as it goes
        let total = input.total_thoughts.max(input.thought_number);
        Ok(json!({
            "thoughtNumber": input.thought_number,
            "totalThoughts": total,
            "nextThoughtNeeded": input.next_thought_needed,
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(thought: &str, number: u32, total: u32) -> Value {
        json!({
            "thought": thought,
            "thoughtNumber": number,
            "totalThoughts": total,
            "nextThoughtNeeded": number < total,
        })
    }

    #[tokio::test]
    async fn test_think_records() {
        let output = ThinkTool
            .run(input("Planning my approach...", 1, 3), CancellationToken::new())
            .await
            .unwrap();
        let summary: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(summary["thoughtNumber"], 1);
        assert_eq!(summary["nextThoughtNeeded"], true);
    }

    #[tokio::test]
    async fn test_think_total_grows_with_number() {
        let output = ThinkTool
            .run(input("one more", 5, 3), CancellationToken::new())
            .await
            .unwrap();
        let summary: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(summary["totalThoughts"], 5);
    }

    #[tokio::test]
    async fn test_think_empty_thought() {
        let result = ThinkTool.run(input("  ", 1, 1), CancellationToken::new()).await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_think_missing_fields() {
        let result = ThinkTool.run(json!({}), CancellationToken::new()).await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
    }
}
