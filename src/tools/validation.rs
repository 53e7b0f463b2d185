//! Check tool call arguments against a tool's top-level JSON Schema.

use crate::error::ConvoyError;
use crate::types::ToolArgs;

/// Validate `args` against `schema`, reporting every violation at once.
///
/// Only top-level checks are made: required keys and declared property types.
pub fn validate_arguments(
    tool_name: &str,
    args: &ToolArgs,
    schema: &serde_json::Value,
) -> Result<(), ConvoyError> {
    let mut violations = Vec::new();

    let required = schema
        .get("required")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str());
    for key in required {
        if !args.contains_key(key) {
            violations.push(format!("missing required parameter '{key}'"));
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) {
        for (key, value) in args {
            let Some(expected) = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            if !matches_type(value, expected) {
                violations.push(format!(
                    "parameter '{key}' must be {expected}, got {}",
                    type_name(value)
                ));
            }
        }
    }

    if violations.is_empty() {
        return Ok(());
    }
    Err(ConvoyError::InvalidArgument(format!(
        "invalid arguments for {tool_name}: {}",
        violations.join("; ")
    )))
}

fn matches_type(value: &serde_json::Value, expected: &str) -> bool {
    use serde_json::Value;
    match (expected, value) {
        ("string", Value::String(_))
        | ("boolean", Value::Bool(_))
        | ("object", Value::Object(_))
        | ("array", Value::Array(_))
        | ("null", Value::Null)
        | ("number", Value::Number(_)) => true,
        ("integer", Value::Number(n)) => n.is_i64() || n.is_u64(),
        ("string" | "boolean" | "object" | "array" | "null" | "number" | "integer", _) => false,
        _ => true,
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
