//! REGON MCP Server Library
//!
//! A Model Context Protocol (MCP) server exposing the Polish GUS REGON
//! business registry (BIR 1.1) as tools, over newline-delimited JSON-RPC on
//! stdio or an HTTP REST surface.
//!
//! # Architecture
//!
//! The server is organized into the following modules:
//!
//! - **core**: Infrastructure: configuration, errors and retries, the
//!   JSON-RPC session and dispatcher, transports and the process lifecycle
//! - **domains**: Business logic organized by bounded contexts
//!   - **regon**: The registry client
//!   - **tools**: MCP tools that can be executed by clients
//!
//! # Example
//!
//! ```rust,no_run
//! use regon_mcp_server::core::{Config, Lifecycle};
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let config = Config::from_env();
//!     Lifecycle::new(config).run().await
//! }
//! ```

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Dispatcher, Error, ErrorRecord, Lifecycle, Result};
