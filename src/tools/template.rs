//! `{{param}}` templates shared by the configurable tools

use super::ToolError;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// A named parameter substituted into a tool template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParam {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl TemplateParam {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Object schema with one string property per parameter
pub(crate) fn params_schema(params: &[TemplateParam]) -> Value {
    let properties: Map<String, Value> = params
        .iter()
        .map(|p| {
            (
                p.name.clone(),
                json!({ "type": "string", "description": p.description }),
            )
        })
        .collect();
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    json!({
        "type": "object",
        "required": required,
        "properties": properties,
    })
}

/// Look up every parameter's value; missing optional ones become empty
pub(crate) fn param_values<'a>(
    params: &'a [TemplateParam],
    input: &Map<String, Value>,
) -> Result<HashMap<&'a str, String>, ToolError> {
    params
        .iter()
        .map(|param| {
            let value = match input.get(&param.name) {
                Some(Value::Null) | None if param.required => {
                    return Err(ToolError::InvalidInput(format!(
                        "missing required parameter '{}'",
                        param.name
                    )));
                }
                Some(Value::Null) | None => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            Ok((param.name.as_str(), value))
        })
        .collect()
}

/// Substitute `{{name}}` tokens in a single pass over `template`
///
/// Substituted text is never scanned again, so a value containing `{{x}}`
/// stays literal. Unknown tokens are kept as written.
pub(crate) fn render(
    template: &str,
    values: &HashMap<&str, String>,
    encode: impl Fn(&str) -> String,
) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some((before, after)) = rest.split_once("{{") {
        rendered.push_str(before);
        let Some((name, tail)) = after.split_once("}}") else {
            rendered.push_str("{{");
            rest = after;
            break;
        };
        match values.get(name) {
            Some(value) => rendered.push_str(&encode(value)),
            None => {
                rendered.push_str("{{");
                rendered.push_str(name);
                rendered.push_str("}}");
            }
        }
        rest = tail;
    }

    rendered.push_str(rest);
    rendered
}
