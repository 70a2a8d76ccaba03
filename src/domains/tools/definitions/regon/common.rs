//! Common utilities shared across REGON tools.
//!
//! Parameter decoding, descriptor construction and response formatting.

use rmcp::{
    handler::server::tool::cached_schema_for_type,
    model::{CallToolResult, Content, JsonObject, Tool},
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::warn;

use crate::core::error::ErrorRecord;
use crate::core::security::normalize_identifier;
use crate::domains::regon::Record;

/// Most identifiers accepted by one bulk search.
pub const MAX_BATCH: usize = 20;

/// Parameters of tools that take no arguments.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

/// Build a descriptor whose input schema is generated from `P`.
pub fn descriptor<P: JsonSchema + 'static>(name: &'static str, description: &'static str) -> Tool {
    Tool {
        name: name.into(),
        description: Some(description.into()),
        input_schema: cached_schema_for_type::<P>(),
        annotations: None,
        output_schema: None,
        icons: None,
        meta: None,
        title: None,
    }
}

/// Decode validated arguments into a parameter struct.
pub fn parse_params<P: DeserializeOwned>(arguments: JsonObject) -> Result<P, ErrorRecord> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| ErrorRecord::validation(format!("Invalid arguments: {}", e)))
}

/// Create a success result with text content.
pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

/// Render registry records as pretty JSON text plus structured content.
///
/// No records yields a plain informational text instead.
pub fn records_result(records: Vec<Record>, empty_message: &str) -> CallToolResult {
    if records.is_empty() {
        return text_result(empty_message);
    }

    let count = records.len();
    let records = Value::Array(records.into_iter().map(Value::Object).collect());
    let text = serde_json::to_string_pretty(&records).unwrap_or_else(|_| records.to_string());

    let mut result = text_result(text);
    result.structured_content = Some(json!({
        "count": count,
        "records": records,
    }));
    result
}

/// Keep the well-formed identifiers of a batch.
///
/// More than [`MAX_BATCH`] entries is rejected outright; malformed entries
/// are skipped with a warning; an empty outcome is a validation error.
pub fn filter_batch(
    label: &str,
    values: &[String],
    lengths: &[usize],
) -> Result<Vec<String>, ErrorRecord> {
    if values.len() > MAX_BATCH {
        return Err(ErrorRecord::validation(format!(
            "Maximum {} {} numbers allowed per request (got {})",
            MAX_BATCH,
            label,
            values.len()
        )));
    }

    let valid: Vec<String> = values
        .iter()
        .filter_map(|raw| {
            let normalized = normalize_identifier(raw);
            let ok = normalized.chars().all(|c| c.is_ascii_digit())
                && lengths.contains(&normalized.len());
            if !ok {
                warn!("Skipping invalid {}: {}", label, raw);
            }
            ok.then_some(normalized)
        })
        .collect();

    if valid.is_empty() {
        return Err(ErrorRecord::validation(format!(
            "No valid {} numbers provided",
            label
        )));
    }

    Ok(valid)
}
