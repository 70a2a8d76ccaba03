//! Transport configuration types.

use serde::{Deserialize, Serialize};

/// Transport configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Newline-delimited JSON-RPC over standard input/output (default for MCP).
    #[cfg(feature = "stdio")]
    Stdio,

    /// HTTP REST surface plus stateless JSON-RPC over POST.
    #[cfg(feature = "http")]
    Http(HttpConfig),
}

/// HTTP transport configuration.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Port number to listen on.
    pub port: u16,

    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Path for the JSON-RPC endpoint.
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,

    /// Enable CORS for browser clients.
    #[serde(default = "default_cors")]
    pub enable_cors: bool,
}

#[cfg(feature = "http")]
fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[cfg(feature = "http")]
fn default_rpc_path() -> String {
    "/mcp".to_string()
}

#[cfg(feature = "http")]
fn default_cors() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        #[cfg(feature = "stdio")]
        {
            return Self::Stdio;
        }

        #[cfg(all(not(feature = "stdio"), feature = "http"))]
        {
            return Self::Http(HttpConfig::default());
        }

        #[cfg(not(any(feature = "stdio", feature = "http")))]
        {
            compile_error!("At least one transport feature must be enabled: stdio or http");
        }
    }
}

#[cfg(feature = "http")]
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: default_host(),
            rpc_path: default_rpc_path(),
            enable_cors: default_cors(),
        }
    }
}

impl TransportConfig {
    /// Load transport config from environment variables.
    pub fn from_env() -> Self {
        let transport = std::env::var("MCP_TRANSPORT")
            .unwrap_or_default()
            .to_lowercase();

        match transport.as_str() {
            #[cfg(feature = "http")]
            "http" => {
                let port = std::env::var("MCP_HTTP_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8000);
                let host = std::env::var("MCP_HTTP_HOST").unwrap_or_else(|_| default_host());
                let rpc_path =
                    std::env::var("MCP_HTTP_PATH").unwrap_or_else(|_| default_rpc_path());
                let enable_cors = std::env::var("MCP_HTTP_CORS")
                    .map(|v| v.to_lowercase() != "false" && v != "0")
                    .unwrap_or(true);
                Self::Http(HttpConfig {
                    port,
                    host,
                    rpc_path,
                    enable_cors,
                })
            }
            #[cfg(feature = "stdio")]
            _ => Self::Stdio,
            #[cfg(all(not(feature = "stdio"), feature = "http"))]
            _ => Self::Http(HttpConfig::default()),
        }
    }

    /// Get a description of this transport for logging.
    pub fn description(&self) -> String {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio => "STDIO (standard MCP mode)".to_string(),
            #[cfg(feature = "http")]
            Self::Http(cfg) => format!("HTTP on {}:{}", cfg.host, cfg.port),
        }
    }

    /// Reject settings that cannot be served.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio => Ok(()),
            #[cfg(feature = "http")]
            Self::Http(cfg) => cfg.validate(),
        }
    }
}

/// Paths owned by the REST surface.
#[cfg(feature = "http")]
const RESERVED_PATHS: &[&str] = &["/", "/health", "/tools", "/tools/call"];

#[cfg(feature = "http")]
impl HttpConfig {
    /// Check that the JSON-RPC path can be mounted next to the REST routes.
    pub fn validate(&self) -> Result<(), String> {
        let path = self.rpc_path.as_str();
        if !path.starts_with('/') {
            return Err(format!("MCP_HTTP_PATH must start with '/' (got '{}')", path));
        }
        if path.contains(['{', '}', '*']) {
            return Err(format!("MCP_HTTP_PATH must be a literal path (got '{}')", path));
        }
        if RESERVED_PATHS.contains(&path) || path.starts_with("/search/") {
            return Err(format!(
                "MCP_HTTP_PATH '{}' collides with a built-in route",
                path
            ));
        }
        Ok(())
    }
}
