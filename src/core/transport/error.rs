//! Transport error types.

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that terminate a transport run.
///
/// Per-request failures never show up here: they are answered on the wire.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to bind to address.
    #[error("Failed to bind to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error on the underlying stream.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The response writer stopped before the run loop finished.
    #[error("Writer error: {0}")]
    WriterError(String),

    /// HTTP-specific error.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The run loop panicked.
    #[error("Run loop panicked: {0}")]
    Panicked(String),
}

impl TransportError {
    /// Create a bind error.
    pub fn bind(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::BindError {
            address: address.into(),
            source,
        }
    }

    /// Create a writer error.
    pub fn writer(msg: impl Into<String>) -> Self {
        Self::WriterError(msg.into())
    }

    /// Create an HTTP error.
    pub fn http(msg: impl Into<String>) -> Self {
        Self::HttpError(msg.into())
    }

    /// Create an error for a caught panic.
    pub fn panicked(msg: impl Into<String>) -> Self {
        Self::Panicked(msg.into())
    }

    /// Whether restarting the run loop could help.
    ///
    /// A port that cannot be bound will not become bindable by retrying
    /// immediately, so bind failures are fatal.
    pub fn is_restartable(&self) -> bool {
        !matches!(self, Self::BindError { .. })
    }
}
