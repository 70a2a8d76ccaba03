//! Error types and handling for the MCP server.
//!
//! Two layers live here:
//!
//! - [`ErrorRecord`]: the classified failure surfaced to callers. Every error a
//!   client sees (JSON-RPC error object or HTTP error body) is exactly one
//!   record with exactly one [`ErrorKind`].
//! - [`Error`]: process-level failures (startup, configuration, transports)
//!   that never reach a client directly.

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// A specialized Result type for MCP server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// The registry rejected our credentials.
    Authentication,
    /// Connectivity problem or timeout talking to the registry.
    Network,
    /// Registry reachable but reported a failure.
    Upstream,
    /// Missing or invalid startup configuration.
    Configuration,
    /// Unexpected defect.
    Internal,
    /// Requested tool does not exist.
    NotFound,
    /// Tool access attempted before the handshake completed.
    NotInitialized,
}

impl ErrorKind {
    /// Stable lowercase name used in logs and response bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Network => "network",
            Self::Upstream => "upstream",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
            Self::NotFound => "not_found",
            Self::NotInitialized => "not_initialized",
        }
    }

    /// Transport status suggested for this kind of failure.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authentication => 401,
            Self::NotFound => 404,
            Self::NotInitialized => 409,
            Self::Upstream => 502,
            Self::Network => 503,
            Self::Configuration | Self::Internal => 500,
        }
    }

    /// JSON-RPC error code for this kind of failure.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::Validation => codes::INVALID_PARAMS,
            Self::NotFound => codes::METHOD_NOT_FOUND,
            Self::NotInitialized => codes::NOT_INITIALIZED,
            Self::Authentication => codes::AUTHENTICATION,
            Self::Network => codes::NETWORK,
            Self::Upstream => codes::UPSTREAM,
            Self::Configuration | Self::Internal => codes::INTERNAL_ERROR,
        }
    }

    /// Message shown instead of the real one when details are suppressed.
    pub fn generic_message(&self) -> &'static str {
        match self {
            Self::Validation => "The request was invalid",
            Self::Authentication => "The registry rejected the configured credentials",
            Self::Network => "The registry could not be reached. Please try again later",
            Self::Upstream => "The registry reported an error. Please try again later",
            Self::Configuration => "The server is misconfigured",
            Self::Internal => "An unexpected error occurred",
            Self::NotFound => "The requested tool does not exist",
            Self::NotInitialized => "The session has not been initialized",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-RPC 2.0 error codes used by the server.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub const AUTHENTICATION: i32 = -32001;
    pub const NOT_INITIALIZED: i32 = -32002;
    pub const NETWORK: i32 = -32003;
    pub const UPSTREAM: i32 = -32004;
}

/// A classified failure, optionally caused by another one.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ErrorRecord {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    #[source]
    cause: Option<Box<ErrorRecord>>,
}

impl ErrorRecord {
    /// Create a record with the default retry classification for `kind`.
    ///
    /// Only network failures are retryable by default; use
    /// [`ErrorRecord::upstream_transient`] for retryable upstream failures.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind == ErrorKind::Network,
            cause: None,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, msg)
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, msg)
    }

    /// Upstream failure that will not go away by retrying.
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, msg)
    }

    /// Upstream failure worth retrying (overload, 5xx, session churn).
    pub fn upstream_transient(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, msg).with_retryable(true)
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotInitialized, msg)
    }

    /// Override the retry classification.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach the error that caused this one.
    pub fn with_cause(mut self, cause: ErrorRecord) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn cause(&self) -> Option<&ErrorRecord> {
        self.cause.as_deref()
    }

    /// Iterate over the cause chain, nearest cause first.
    pub fn causes(&self) -> impl Iterator<Item = &ErrorRecord> {
        std::iter::successors(self.cause(), |record| record.cause())
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    pub fn rpc_code(&self) -> i32 {
        self.kind.rpc_code()
    }

    /// Render the record for a response body.
    ///
    /// With `detailed` the real message and the full cause chain are included;
    /// otherwise only the kind and a generic message are exposed.
    pub fn to_json(&self, detailed: bool) -> Value {
        if !detailed {
            return json!({
                "kind": self.kind,
                "message": self.kind.generic_message(),
            });
        }

        let causes: Vec<Value> = self
            .causes()
            .map(|c| {
                json!({
                    "kind": c.kind,
                    "message": c.message,
                    "retryable": c.retryable,
                })
            })
            .collect();

        let mut body = json!({
            "kind": self.kind,
            "message": self.message,
            "retryable": self.retryable,
        });
        if !causes.is_empty() {
            body["causes"] = Value::Array(causes);
        }
        body
    }
}

/// Unified process-level error type.
///
/// These errors terminate startup or a transport run; per-request failures
/// are [`ErrorRecord`]s instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Error building the tool registry.
    #[error("Tool error: {0}")]
    Tool(#[from] crate::domains::tools::ToolError),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from file operations or network communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] super::transport::TransportError),

    /// Internal server errors that should not occur under normal operation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<Error> for ErrorRecord {
    fn from(err: Error) -> Self {
        match err {
            Error::Config(msg) => ErrorRecord::configuration(msg),
            Error::Tool(e) => ErrorRecord::configuration(e.to_string()),
            other => ErrorRecord::internal(other.to_string()),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }

    #[test]
    fn test_default_retry_classification() {
        assert!(ErrorRecord::network("timeout").is_retryable());
        assert!(ErrorRecord::upstream_transient("busy").is_retryable());
        assert!(!ErrorRecord::upstream("bad report").is_retryable());
        assert!(!ErrorRecord::validation("bad nip").is_retryable());
        assert!(!ErrorRecord::authentication("bad key").is_retryable());
        assert!(!ErrorRecord::configuration("no key").is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorRecord::validation("x").http_status(), 400);
        assert_eq!(ErrorRecord::authentication("x").http_status(), 401);
        assert_eq!(ErrorRecord::not_found("x").http_status(), 404);
        assert_eq!(ErrorRecord::upstream("x").http_status(), 502);
        assert_eq!(ErrorRecord::network("x").http_status(), 503);
        assert_eq!(ErrorRecord::configuration("x").http_status(), 500);
        assert_eq!(ErrorRecord::internal("x").http_status(), 500);
    }

    #[test]
    fn test_cause_chain_iteration() {
        let record = ErrorRecord::network("third")
            .with_cause(ErrorRecord::network("second").with_cause(ErrorRecord::network("first")));
        let messages: Vec<_> = record.causes().map(|c| c.message()).collect();
        assert_eq!(messages, vec!["second", "first"]);
    }

    #[test]
    fn test_to_json_detailed_includes_causes() {
        let record = ErrorRecord::upstream("outer").with_cause(ErrorRecord::network("inner"));
        let body = record.to_json(true);
        assert_eq!(body["kind"], "upstream");
        assert_eq!(body["message"], "outer");
        assert_eq!(body["causes"][0]["message"], "inner");
        assert_eq!(body["causes"][0]["kind"], "network");
    }

    #[test]
    fn test_to_json_suppressed_hides_detail() {
        let record = ErrorRecord::internal("secret stack detail")
            .with_cause(ErrorRecord::network("inner"));
        let body = record.to_json(false);
        assert_eq!(body["kind"], "internal");
        assert!(body.get("causes").is_none());
        assert!(!body.to_string().contains("secret"));
    }

    #[test]
    fn test_display_has_kind_prefix() {
        let record = ErrorRecord::validation("NIP must be exactly 10 digits");
        assert_eq!(record.to_string(), "validation: NIP must be exactly 10 digits");
    }
}
