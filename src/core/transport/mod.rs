//! Transport layer for the MCP server.
//!
//! This module provides different transport implementations:
//! - **STDIO**: Newline-delimited JSON-RPC over standard input/output (default for MCP) - feature: `stdio`
//! - **HTTP**: REST surface plus stateless JSON-RPC over POST - feature: `http`
//!
//! Each transport handles the connection lifecycle and delegates
//! message processing to the shared [`Dispatcher`](crate::core::Dispatcher).
//!
//! # Feature Flags
//!
//! Transport implementations are conditionally compiled based on features:
//! - `stdio` (default): STDIO transport - minimal dependencies
//! - `http` (default): HTTP transport - adds axum, tower, tower-http

mod config;
mod error;
mod service;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "stdio")]
pub mod stdio;

use tokio::sync::watch;

pub use config::TransportConfig;
pub use error::{TransportError, TransportResult};
pub use service::TransportService;

#[cfg(feature = "http")]
pub use config::HttpConfig;

/// Resolves once shutdown is signalled; never if the sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
