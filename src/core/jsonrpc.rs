//! JSON-RPC 2.0 envelopes shared by every transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ErrorRecord, codes};

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC response structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// Echoed request id; `null` when the request could not be identified.
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Error response carrying a classified failure.
    ///
    /// `detailed` controls whether the real message and cause chain are sent.
    pub fn from_record(id: Value, record: &ErrorRecord, detailed: bool) -> Self {
        let body = record.to_json(detailed);
        let message = body["message"]
            .as_str()
            .unwrap_or(record.kind().generic_message())
            .to_string();
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: record.rpc_code(),
                message,
                data: Some(body),
            }),
        }
    }

    /// Parse error (the line was not valid JSON).
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::error(
            Value::Null,
            codes::PARSE_ERROR,
            format!("Parse error: {}", detail.into()),
        )
    }

    /// Invalid request error.
    pub fn invalid_request(id: Value, msg: impl Into<String>) -> Self {
        Self::error(id, codes::INVALID_REQUEST, msg)
    }

    /// Method not found error.
    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::error(
            id,
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    /// Invalid params error.
    pub fn invalid_params(id: Value, msg: impl Into<String>) -> Self {
        Self::error(id, codes::INVALID_PARAMS, msg)
    }

    /// Internal error.
    pub fn internal_error(id: Value, msg: impl Into<String>) -> Self {
        Self::error(id, codes::INTERNAL_ERROR, msg)
    }
}

/// A well-formed incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Expects exactly one response carrying `id`.
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    /// No `id` member: never answered.
    Notification { method: String, params: Value },
}

impl Incoming {
    pub fn method(&self) -> &str {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => method,
        }
    }

    /// Validate a decoded JSON value as a JSON-RPC 2.0 message.
    ///
    /// On failure returns the `-32600` response to send back (with the id,
    /// when one could be recovered).
    pub fn from_value(value: Value) -> Result<Self, JsonRpcResponse> {
        let Value::Object(mut obj) = value else {
            let what = if value.is_array() {
                "Batch requests are not supported"
            } else {
                "Request must be a JSON object"
            };
            return Err(JsonRpcResponse::invalid_request(Value::Null, what));
        };

        let id = obj.remove("id");
        let reply_id = id.clone().unwrap_or(Value::Null);

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(JsonRpcResponse::invalid_request(
                reply_id,
                "Invalid Request: jsonrpc must be \"2.0\"",
            ));
        }

        let method = match obj.remove("method") {
            Some(Value::String(method)) if !method.is_empty() => method,
            _ => {
                return Err(JsonRpcResponse::invalid_request(
                    reply_id,
                    "Invalid Request: method must be a non-empty string",
                ));
            }
        };

        let params = obj.remove("params").unwrap_or(Value::Null);

        match id {
            None => Ok(Self::Notification { method, params }),
            Some(id @ (Value::String(_) | Value::Number(_) | Value::Null)) => {
                Ok(Self::Request { id, method, params })
            }
            Some(_) => Err(JsonRpcResponse::invalid_request(
                Value::Null,
                "Invalid Request: id must be a string, number or null",
            )),
        }
    }

    /// Decode one line of input.
    pub fn parse(line: &str) -> Result<Self, JsonRpcResponse> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| JsonRpcResponse::parse_error(e.to_string()))?;
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let msg = Incoming::parse(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"test"}}"#,
        )
        .unwrap();
        match msg {
            Incoming::Request { id, method, params } => {
                assert_eq!(id, json!(1));
                assert_eq!(method, "tools/call");
                assert_eq!(params["name"], "test");
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_notification() {
        let msg = Incoming::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .unwrap();
        assert!(matches!(msg, Incoming::Notification { .. }));
        assert_eq!(msg.method(), "notifications/initialized");
    }

    #[test]
    fn test_parse_error_has_null_id() {
        let resp = Incoming::parse("{not json").unwrap_err();
        assert_eq!(resp.id, Value::Null);
        assert_eq!(resp.error.unwrap().code, codes::PARSE_ERROR);
    }

    #[test]
    fn test_invalid_request_keeps_id() {
        let resp = Incoming::parse(r#"{"jsonrpc":"1.0","id":"abc","method":"ping"}"#).unwrap_err();
        assert_eq!(resp.id, json!("abc"));
        assert_eq!(resp.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[test]
    fn test_batch_is_rejected() {
        let resp = Incoming::parse(r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#).unwrap_err();
        assert_eq!(resp.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[test]
    fn test_missing_method_is_invalid() {
        let resp = Incoming::parse(r#"{"jsonrpc":"2.0","id":7}"#).unwrap_err();
        assert_eq!(resp.id, json!(7));
        assert_eq!(resp.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[test]
    fn test_response_success_serialization() {
        let resp = JsonRpcResponse::success(json!(1), json!({"ok": true}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_response_from_record() {
        let record = ErrorRecord::not_initialized("Session not initialized");
        let resp = JsonRpcResponse::from_record(json!(3), &record, true);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], codes::NOT_INITIALIZED);
        assert_eq!(json["error"]["data"]["kind"], "not_initialized");
        assert!(json.get("result").is_none());
    }
}
