//! Tools domain module.
//!
//! This module handles all tool-related functionality for the MCP server.
//! Tools are the named, schema-described operations clients invoke through
//! `tools/call` or the HTTP surface.
//!
//! ## Architecture
//!
//! - `definitions/` - Tool implementations, grouped by concern
//! - `handlers.rs` - The `ToolHandler` trait and per-call context
//! - `registry.rs` - Catalog loading, fallback set and lookup
//! - `schema.rs` - Argument checking against a descriptor's input schema
//! - `error.rs` - Registry load errors
//!
//! ## Adding a New Tool
//!
//! 1. Implement `ToolHandler` in a file under `definitions/`
//! 2. Add it to `definitions::builtin_handlers()`
//! 3. Describe it in the catalog files under `config/`

pub mod definitions;
mod error;
mod handlers;
mod registry;
pub mod schema;

pub use error::ToolError;
pub use handlers::{ToolContext, ToolHandler};
pub use registry::{CatalogInfo, RegisteredTool, RegistrySource, ToolRegistry};
