//! Tool definitions module.
//!
//! This module exports all available tool definitions.
//! Each group of related tools is defined in its own file.

pub mod regon;

use std::sync::Arc;

pub use regon::{
    AvailableOperationsTool, DataStatusTool, FullReportTool, LastErrorCodeTool,
    LastErrorMessageTool, SearchByKrsTool, SearchByNipTool, SearchByRegonTool,
    SearchMultipleKrsTool, SearchMultipleNipsTool, SearchMultipleRegons9Tool, ServiceStatusTool,
    SessionStatusTool,
};

use super::ToolHandler;

/// Every compiled-in tool handler, in listing order.
pub fn builtin_handlers() -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(SearchByNipTool),
        Arc::new(SearchByRegonTool),
        Arc::new(SearchByKrsTool),
        Arc::new(SearchMultipleNipsTool),
        Arc::new(SearchMultipleRegons9Tool),
        Arc::new(SearchMultipleKrsTool),
        Arc::new(FullReportTool),
        Arc::new(ServiceStatusTool),
        Arc::new(DataStatusTool),
        Arc::new(LastErrorCodeTool),
        Arc::new(LastErrorMessageTool),
        Arc::new(SessionStatusTool),
        Arc::new(AvailableOperationsTool),
    ]
}

/// Tools served when no catalog file can be used.
pub const FALLBACK_TOOLS: &[&str] = &[
    SearchByNipTool::NAME,
    SearchByRegonTool::NAME,
    SearchByKrsTool::NAME,
    ServiceStatusTool::NAME,
];
