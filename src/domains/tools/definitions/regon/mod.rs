//! REGON registry tools.
//!
//! - `search`: single-entity search by NIP, REGON or KRS
//! - `bulk`: batch searches of up to 20 identifiers
//! - `report`: full BIR 1.1 reports
//! - `status`: service, data and session status lookups

pub mod bulk;
pub mod common;
pub mod report;
pub mod search;
pub mod status;

pub use bulk::{SearchMultipleKrsTool, SearchMultipleNipsTool, SearchMultipleRegons9Tool};
pub use report::FullReportTool;
pub use search::{SearchByKrsTool, SearchByNipTool, SearchByRegonTool};
pub use status::{
    AvailableOperationsTool, DataStatusTool, LastErrorCodeTool, LastErrorMessageTool,
    ServiceStatusTool, SessionStatusTool,
};
