//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for the MCP server:
//! error handling and retries, configuration, the JSON-RPC envelope, the
//! handshake session, the request dispatcher, process lifecycle management
//! and the transport layer.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod jsonrpc;
pub mod lifecycle;
pub mod retry;
pub mod security;
pub mod session;
pub mod transport;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{Error, ErrorKind, ErrorRecord, Result};
pub use lifecycle::Lifecycle;
pub use retry::{RetryPolicies, RetryPolicy};
pub use session::{Session, SessionState};
pub use transport::{TransportConfig, TransportService};
