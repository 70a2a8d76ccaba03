//! Process lifecycle management.
//!
//! Handles startup validation, the registry probe, termination signals and
//! supervised restarts of the transport run loop.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::config::{Config, LifecycleConfig};
use super::dispatcher::Dispatcher;
use super::error::{Error, Result, panic_message};
use super::transport::{TransportError, TransportResult, TransportService, shutdown_requested};
use crate::domains::regon::{BirClient, RegistryClient};
use crate::domains::tools::{RegistrySource, ToolContext, ToolRegistry};

/// How the supervised run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Input ended or shutdown was requested.
    Clean,
    /// Fatal transport error or restarts exhausted.
    Failed,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Clean => ExitCode::SUCCESS,
            Outcome::Failed => ExitCode::FAILURE,
        }
    }
}

/// Owns the process from validated configuration to exit code.
pub struct Lifecycle {
    config: Arc<Config>,
}

impl Lifecycle {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Run the server until shutdown. Never opens a transport when startup fails.
    pub async fn run(self) -> ExitCode {
        let dispatcher = match startup(self.config.clone()) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                error!("Startup failed: {}", e);
                return ExitCode::FAILURE;
            }
        };

        tokio::spawn(probe(dispatcher.clone()));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signals = tokio::spawn(async move {
            wait_for_signal().await;
            let _ = shutdown_tx.send(true);
        });

        let lifecycle = &self.config.lifecycle;
        let transport = TransportService::new(
            self.config.transport.clone(),
            lifecycle.shutdown_grace,
        );

        let outcome = supervise(lifecycle, &shutdown_rx, || {
            transport.run(dispatcher.clone(), shutdown_rx.clone())
        })
        .await;

        signals.abort();
        info!("Server shutting down ({:?})", outcome);
        outcome.into()
    }
}

/// Validate configuration and build the shared dispatcher.
///
/// A missing credential is fatal. The tool registry is built here, once per
/// process, and survives restarts of the run loop.
pub fn startup(config: Arc<Config>) -> Result<Dispatcher> {
    config.transport.validate().map_err(Error::config)?;

    let api_key = config
        .credentials
        .resolve(config.production)
        .map_err(|e| Error::config(e.message()))?;

    let client = BirClient::for_mode(
        config.production,
        config.upstream.endpoint.as_deref(),
        api_key,
        config.retry.search.attempt_timeout,
    )
    .map_err(|e| Error::config(e.message()))?;

    info!(
        "Registry endpoint: {} ({} mode)",
        client.endpoint(),
        if config.production { "production" } else { "test" }
    );

    Ok(assemble(config, Arc::new(client)))
}

/// Wire a registry client, the tool registry and the retry policies together.
pub fn assemble(config: Arc<Config>, client: Arc<dyn RegistryClient>) -> Dispatcher {
    let registry = ToolRegistry::load(&config.tools);
    if let RegistrySource::Fallback { reason } = registry.source() {
        warn!("Serving {} fallback tools ({})", registry.len(), reason);
    }
    let context = ToolContext::new(client, config.retry.clone());
    Dispatcher::new(registry, context, config)
}

/// Log in and check the registry status once. Failures are only logged.
pub async fn probe(dispatcher: Dispatcher) {
    let ctx = dispatcher.context();
    let policy = &ctx.policies.health;

    if let Err(e) = policy.run("registry login", || ctx.client.login()).await {
        warn!("Registry login probe failed: {}", e);
        return;
    }

    match policy.run("registry status", || ctx.client.service_status()).await {
        Ok(status) => info!(
            "Registry reachable: {} ({})",
            status.message, status.code
        ),
        Err(e) => warn!("Registry status probe failed: {}", e),
    }
}

/// Backoff before the n-th restart: `min(step * n, max)`.
pub fn restart_delay(lifecycle: &LifecycleConfig, restart: u32) -> Duration {
    lifecycle
        .restart_step
        .saturating_mul(restart)
        .min(lifecycle.restart_max_delay)
}

/// Run `run_once` until it ends cleanly, fails fatally, or restarts run out.
///
/// Only restartable transport errors are retried; a panic in the run loop
/// counts as one. A pending restart is abandoned when shutdown is requested.
pub async fn supervise<F, Fut>(
    lifecycle: &LifecycleConfig,
    shutdown: &watch::Receiver<bool>,
    mut run_once: F,
) -> Outcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TransportResult<()>>,
{
    let mut restarts: u32 = 0;

    loop {
        let err = match AssertUnwindSafe(run_once()).catch_unwind().await {
            Ok(Ok(())) => return Outcome::Clean,
            Ok(Err(err)) => err,
            Err(panic) => {
                let detail = panic_message(&*panic);
                error!("Transport run loop panicked: {}", detail);
                TransportError::panicked(detail)
            }
        };

        if *shutdown.borrow() {
            warn!("Transport failed while shutting down: {}", err);
            return Outcome::Clean;
        }

        if !err.is_restartable() {
            error!("Fatal transport error: {}", err);
            return Outcome::Failed;
        }

        if restarts >= lifecycle.max_restarts {
            error!(
                "Transport failed: {}. Giving up after {} restart(s)",
                err, restarts
            );
            return Outcome::Failed;
        }

        restarts += 1;
        let delay = restart_delay(lifecycle, restarts);
        warn!(
            "Transport failed: {}. Restart {}/{} in {:?}",
            err, restarts, lifecycle.max_restarts, delay
        );

        let mut stop = shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_requested(&mut stop) => {
                info!("Shutdown requested during restart backoff");
                return Outcome::Clean;
            }
        }
    }
}

/// Wait for SIGINT (ctrl-c) or, on unix, SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received interrupt, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CredentialsConfig;
    use crate::core::error::ErrorRecord;
    use crate::domains::regon::testing::ScriptedClient;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn lifecycle(max_restarts: u32) -> LifecycleConfig {
        LifecycleConfig {
            max_restarts,
            ..LifecycleConfig::default()
        }
    }

    fn io_failure() -> TransportError {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into()
    }

    async fn broken_run_loop() -> TransportResult<()> {
        panic!("always broken")
    }

    #[test]
    fn test_restart_delay_is_capped() {
        let l = LifecycleConfig::default();
        assert_eq!(restart_delay(&l, 1), Duration::from_secs(5));
        assert_eq!(restart_delay(&l, 3), Duration::from_secs(15));
        assert_eq!(restart_delay(&l, 10), Duration::from_secs(30));
    }

    #[test]
    fn test_startup_without_credentials_is_fatal() {
        let config = Config {
            production: true,
            credentials: CredentialsConfig {
                api_key: None,
                test_api_key: None,
                default_test_key: None,
            },
            ..Config::default()
        };
        let err = startup(Arc::new(config)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("API_KEY"));
    }

    #[test]
    fn test_startup_test_mode_uses_default_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.tools.dir = dir.path().to_path_buf();
        let dispatcher = startup(Arc::new(config)).unwrap();
        assert!(dispatcher.registry().source().is_fallback());
        assert_eq!(dispatcher.registry().len(), 4);
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_startup_rejects_unusable_rpc_path() {
        use crate::core::transport::{HttpConfig, TransportConfig};

        let config = Config {
            transport: TransportConfig::Http(HttpConfig {
                rpc_path: "/tools/call".to_string(),
                ..HttpConfig::default()
            }),
            ..Config::default()
        };
        let err = startup(Arc::new(config)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("MCP_HTTP_PATH"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_exit_does_not_restart() {
        let (_tx, rx) = watch::channel(false);
        let runs = AtomicU32::new(0);
        let outcome = supervise(&lifecycle(3), &rx, || {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
        assert_eq!(outcome, Outcome::Clean);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_with_backoff_then_gives_up() {
        let (_tx, rx) = watch::channel(false);
        let runs = AtomicU32::new(0);
        let started = Instant::now();
        let outcome = supervise(&lifecycle(3), &rx, || {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Err(io_failure()) }
        })
        .await;
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        // 5 s + 10 s + 15 s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let (_tx, rx) = watch::channel(false);
        let runs = AtomicU32::new(0);
        let outcome = supervise(&lifecycle(3), &rx, || {
            let n = runs.fetch_add(1, Ordering::SeqCst);
            async move { if n == 0 { Err(io_failure()) } else { Ok(()) } }
        })
        .await;
        assert_eq!(outcome, Outcome::Clean);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_run_loop_is_restarted() {
        let (_tx, rx) = watch::channel(false);
        let runs = AtomicU32::new(0);
        let started = Instant::now();
        let outcome = supervise(&lifecycle(3), &rx, || {
            let n = runs.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    panic!("read loop defect");
                }
                Ok(())
            }
        })
        .await;
        assert_eq!(outcome, Outcome::Clean);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_panics_exhaust_restarts() {
        let (_tx, rx) = watch::channel(false);
        let runs = AtomicU32::new(0);
        let outcome = supervise(&lifecycle(2), &rx, || {
            runs.fetch_add(1, Ordering::SeqCst);
            broken_run_loop()
        })
        .await;
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_failure_is_fatal() {
        let (_tx, rx) = watch::channel(false);
        let runs = AtomicU32::new(0);
        let outcome = supervise(&lifecycle(3), &rx, || {
            runs.fetch_add(1, Ordering::SeqCst);
            async {
                Err(TransportError::bind(
                    "127.0.0.1:8000",
                    std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
                ))
            }
        })
        .await;
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_restart() {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.send(true);
        });
        let runs = AtomicU32::new(0);
        let started = Instant::now();
        let outcome = supervise(&lifecycle(3), &rx, || {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Err(io_failure()) }
        })
        .await;
        assert_eq!(outcome, Outcome::Clean);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_is_not_fatal() {
        let client = Arc::new(ScriptedClient::new());
        client.push_status(Err(ErrorRecord::authentication("rejected")));
        let dispatcher = assemble(Arc::new(Config::default()), client.clone());
        probe(dispatcher).await;
        assert_eq!(client.status_calls(), 1);

        let client = Arc::new(ScriptedClient::new());
        probe(assemble(Arc::new(Config::default()), client.clone())).await;
        assert_eq!(client.status_calls(), 2);
    }
}
