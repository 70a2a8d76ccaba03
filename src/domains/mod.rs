//! Domains module containing business logic organized by bounded contexts.
//!
//! - **regon**: the GUS REGON (BIR 1.1) registry client
//! - **tools**: MCP tools that clients can execute

pub mod regon;
pub mod tools;
