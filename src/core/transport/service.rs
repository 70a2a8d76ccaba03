//! Transport service - orchestrates different transport types.
//!
//! This service provides a unified interface for running the dispatcher
//! behind whichever transport is configured.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use super::{TransportConfig, TransportResult};
use crate::core::dispatcher::Dispatcher;

#[cfg(feature = "stdio")]
use super::stdio::StdioTransport;

#[cfg(feature = "http")]
use super::http::HttpTransport;

/// Transport service - manages the transport layer for the MCP server.
#[derive(Debug, Clone)]
pub struct TransportService {
    config: TransportConfig,
    grace: Duration,
}

impl TransportService {
    /// Create a new transport service.
    ///
    /// `grace` is how long in-flight calls may run once shutdown starts.
    pub fn new(config: TransportConfig, grace: Duration) -> Self {
        Self { config, grace }
    }

    /// Log information about the configured transport.
    pub fn log_info(&self) {
        info!("Starting transport: {}", self.config.description());
    }

    /// Run the configured transport once.
    ///
    /// Returns when input ends, shutdown is signalled, or the transport fails.
    /// Can be called again after a failure.
    pub async fn run(
        &self,
        dispatcher: Dispatcher,
        shutdown: watch::Receiver<bool>,
    ) -> TransportResult<()> {
        self.log_info();

        match &self.config {
            #[cfg(feature = "stdio")]
            TransportConfig::Stdio => {
                StdioTransport::new(self.grace)
                    .run(dispatcher, shutdown)
                    .await
            }
            #[cfg(feature = "http")]
            TransportConfig::Http(cfg) => {
                HttpTransport::new(cfg.clone(), self.grace)
                    .run(dispatcher, shutdown)
                    .await
            }
        }
    }
}
