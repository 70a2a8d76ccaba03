//! Tool registry error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building the tool registry.
///
/// None of these is fatal: the registry falls back to its built-in set.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The catalog file could not be read.
    #[error("Cannot read tool catalog {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog file is not valid JSON of the expected shape.
    #[error("Invalid tool catalog {path}: {source}")]
    InvalidCatalog {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Two tools share a name.
    #[error("Duplicate tool name: {0}")]
    DuplicateName(String),

    /// No declared tool has a compiled-in handler.
    #[error("Tool catalog {0} declares no tool with a known handler")]
    NoBindableTools(PathBuf),
}

impl ToolError {
    /// Create a new "duplicate name" error.
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }
}
