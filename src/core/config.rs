//! Configuration management for the MCP server.
//!
//! This module provides a centralized configuration structure that can be
//! populated from environment variables (optionally via a `.env` file) or
//! defaults.

use super::error::ErrorRecord;
use super::retry::{RetryPolicies, RetryPolicy};
use super::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Public key published by GUS for the BIR test environment.
pub const DEFAULT_TEST_API_KEY: &str = "abcde12345abcde12345";

/// Main configuration structure for the MCP server.
///
/// This struct contains all configurable aspects of the server, organized
/// by concern for clarity and maintainability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Production mode: production registry endpoint, suppressed error detail.
    pub production: bool,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// Registry API credentials configuration.
    pub credentials: CredentialsConfig,

    /// Declarative tool description source.
    pub tools: ToolsConfig,

    /// Retry policies per operation type.
    pub retry: RetryPolicies,

    /// Startup/shutdown behaviour.
    pub lifecycle: LifecycleConfig,

    /// Registry endpoint overrides.
    pub upstream: UpstreamConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,
}

/// Configuration for registry API credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Production key (`API_KEY`).
    pub api_key: Option<String>,

    /// Test environment key (`TEST_API_KEY`).
    pub test_api_key: Option<String>,

    /// Last-resort key for test mode. `None` disables the fallback.
    pub default_test_key: Option<String>,
}

/// Custom Debug implementation to redact secrets from logs.
impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "test_api_key",
                &self.test_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "default_test_key",
                &self.default_test_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            test_api_key: None,
            default_test_key: Some(DEFAULT_TEST_API_KEY.to_string()),
        }
    }
}

impl CredentialsConfig {
    /// Pick the credential for the given mode.
    ///
    /// Production uses `API_KEY`, falling back to `TEST_API_KEY` with a
    /// warning. Test mode uses `TEST_API_KEY`, then `API_KEY`, then the
    /// default public test key. Having nothing usable is a configuration
    /// error.
    pub fn resolve(&self, production: bool) -> Result<String, ErrorRecord> {
        let usable = |key: &Option<String>| {
            key.as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
        };

        if production {
            if let Some(key) = usable(&self.api_key) {
                return Ok(key);
            }
            if let Some(key) = usable(&self.test_api_key) {
                warn!("Production mode requested but no API_KEY found. Using TEST_API_KEY.");
                return Ok(key);
            }
            return Err(ErrorRecord::configuration(
                "Production mode requires API_KEY in environment variables",
            ));
        }

        if let Some(key) = usable(&self.test_api_key) {
            return Ok(key);
        }
        if let Some(key) = usable(&self.api_key) {
            info!("TEST_API_KEY not found. Using API_KEY for testing.");
            return Ok(key);
        }
        if let Some(key) = usable(&self.default_test_key) {
            warn!("No API keys found in environment. Using default test key.");
            return Ok(key);
        }
        Err(ErrorRecord::configuration(
            "No registry API key configured: set TEST_API_KEY or API_KEY",
        ))
    }
}

/// Where the declarative tool descriptions come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Explicit file path. Takes precedence over `dir` + `name`.
    pub file: Option<PathBuf>,

    /// Directory holding `tools_<name>.json` files.
    pub dir: PathBuf,

    /// Configuration name (e.g. "detailed", "polish", "minimal").
    pub name: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            file: None,
            dir: PathBuf::from("config"),
            name: "detailed".to_string(),
        }
    }
}

impl ToolsConfig {
    /// The file the registry should try to load.
    pub fn source_path(&self) -> PathBuf {
        match &self.file {
            Some(file) => file.clone(),
            None => self.dir.join(format!("tools_{}.json", self.name)),
        }
    }
}

/// Startup/shutdown behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Time in-flight calls get to finish after a shutdown signal.
    pub shutdown_grace: Duration,

    /// How many times the run loop is restarted after an internal failure.
    pub max_restarts: u32,

    /// Restart backoff step; the n-th restart waits `min(step * n, max)`.
    pub restart_step: Duration,

    /// Upper bound on the restart backoff.
    pub restart_max_delay: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(10),
            max_restarts: 3,
            restart_step: Duration::from_secs(5),
            restart_max_delay: Duration::from_secs(30),
        }
    }
}

/// Registry endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Override the BIR service URL (otherwise picked by mode).
    pub endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "regon-mcp-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            production: false,
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            transport: TransportConfig::default(),
            credentials: CredentialsConfig::default(),
            tools: ToolsConfig::default(),
            retry: RetryPolicies::default(),
            lifecycle: LifecycleConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        let v = v.trim().to_lowercase();
        v == "1" || v == "true" || v == "yes" || v == "on"
    })
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", name, raw);
            None
        }
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Server settings use the `MCP_` prefix (`MCP_SERVER_NAME`,
    /// `MCP_LOG_LEVEL`, `MCP_PRODUCTION`, ...). Registry keys keep their
    /// conventional names `API_KEY` and `TEST_API_KEY`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(name) = std::env::var("MCP_SERVER_NAME") {
            config.server.name = name;
        }

        if let Ok(level) = std::env::var("MCP_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(production) = env_flag("MCP_PRODUCTION") {
            config.production = production;
        }

        // Load transport configuration from environment
        config.transport = TransportConfig::from_env();

        config.credentials.api_key = env_nonempty("API_KEY");
        config.credentials.test_api_key = env_nonempty("TEST_API_KEY");
        if env_flag("MCP_USE_DEFAULT_TEST_KEY") == Some(false) {
            config.credentials.default_test_key = None;
        }

        // Tool descriptions
        if let Some(file) = env_nonempty("MCP_TOOLS_FILE") {
            config.tools.file = Some(PathBuf::from(file));
        }
        if let Some(dir) = env_nonempty("MCP_TOOLS_DIR") {
            config.tools.dir = PathBuf::from(dir);
        }
        if let Some(name) = env_nonempty("MCP_TOOLS_CONFIG") {
            config.tools.name = name;
        }

        // Retry tuning applies to every registry operation except health probes
        apply_retry_env(&mut config.retry.search);
        apply_retry_env(&mut config.retry.report);
        apply_retry_env(&mut config.retry.status);

        if let Some(secs) = env_parse::<u64>("MCP_SHUTDOWN_GRACE_SECS") {
            config.lifecycle.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(max) = env_parse::<u32>("MCP_MAX_RESTARTS") {
            config.lifecycle.max_restarts = max;
        }

        config.upstream.endpoint = env_nonempty("MCP_REGON_ENDPOINT");

        info!(
            "Configuration loaded ({} mode, tools from {:?})",
            if config.production { "production" } else { "test" },
            config.tools.source_path()
        );

        config
    }
}

fn apply_retry_env(policy: &mut RetryPolicy) {
    if let Some(attempts) = env_parse::<u32>("MCP_RETRY_MAX_ATTEMPTS") {
        policy.max_attempts = attempts.max(1);
    }
    if let Some(ms) = env_parse::<u64>("MCP_RETRY_BASE_DELAY_MS") {
        policy.base_delay = Duration::from_millis(ms);
    }
    if let Some(factor) = env_parse::<f64>("MCP_RETRY_BACKOFF_FACTOR") {
        policy.backoff_factor = factor.max(1.0);
    }
    if let Some(ms) = env_parse::<u64>("MCP_RETRY_JITTER_MS") {
        policy.jitter = Some(Duration::from_millis(ms));
    }
    if let Some(secs) = env_parse::<u64>("MCP_RETRY_MAX_TOTAL_WAIT_SECS") {
        policy.max_total_wait = Duration::from_secs(secs);
    }
    if let Some(secs) = env_parse::<u64>("MCP_REQUEST_TIMEOUT_SECS") {
        policy.attempt_timeout = Duration::from_secs(secs.max(1));
    }
}
