//! Argument checking against a tool's `inputSchema`.
//!
//! Only the subset of JSON Schema the tool descriptors use is enforced:
//! `required`, per-property `type` (a name or a list of names), one level of
//! array `items`, and `additionalProperties: false`.

use rmcp::model::JsonObject;
use serde_json::Value;

use crate::core::error::ErrorRecord;
use crate::core::security::{MAX_ARGUMENT_LENGTH, sanitize_string};

/// Check `arguments` against `schema`.
///
/// Returns the first violation as a validation error.
pub fn validate_arguments(schema: &JsonObject, arguments: &JsonObject) -> Result<(), ErrorRecord> {
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            match arguments.get(name) {
                None | Some(Value::Null) => {
                    return Err(ErrorRecord::validation(format!(
                        "Missing required argument '{}'",
                        name
                    )));
                }
                Some(_) => {}
            }
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (name, value) in arguments {
        let Some(property) = properties.and_then(|p| p.get(name)) else {
            if closed {
                return Err(ErrorRecord::validation(format!(
                    "Unknown argument '{}'",
                    name
                )));
            }
            continue;
        };

        check_type(name, property, value)?;

        if let (Some(items), Value::Array(elements)) = (property.get("items"), value) {
            for (index, element) in elements.iter().enumerate() {
                check_type(&format!("{}[{}]", name, index), items, element)?;
            }
        }
    }

    Ok(())
}

fn check_type(name: &str, schema: &Value, value: &Value) -> Result<(), ErrorRecord> {
    let allowed: Vec<&str> = match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => return Ok(()),
    };

    if allowed.iter().any(|t| matches_type(t, value)) {
        return Ok(());
    }

    Err(ErrorRecord::validation(format!(
        "Argument '{}' must be of type {} (got {})",
        name,
        allowed.join(" or "),
        type_name(value)
    )))
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Sanitize every string argument, including strings inside arrays.
pub fn sanitize_arguments(arguments: JsonObject) -> JsonObject {
    arguments
        .into_iter()
        .map(|(name, value)| (name, sanitize_value(value)))
        .collect()
}

fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(&s, MAX_ARGUMENT_LENGTH)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(sanitize_arguments(map)),
        other => other,
    }
}
