//! MCP Server Entry Point
//!
//! Initializes logging, loads configuration, and hands the process over to
//! the lifecycle manager, which picks the transport and the exit code.

use std::process::ExitCode;

use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

use regon_mcp_server::core::{Config, Lifecycle};

fn main() -> ExitCode {
    // Load configuration from environment
    let config = Config::from_env();

    // Initialize logging
    init_logging(&config.logging.level);

    info!("Starting {} v{}", config.server.name, config.server.version);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let grace = config.lifecycle.shutdown_grace;
    let code = runtime.block_on(Lifecycle::new(config).run());

    // A blocked stdin read cannot be cancelled; do not wait on it forever
    runtime.shutdown_timeout(grace);
    code
}

/// Initialize the logging subsystem.
///
/// Logs go to stderr: stdout carries the protocol in STDIO mode.
fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
