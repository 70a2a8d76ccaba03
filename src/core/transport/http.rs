//! HTTP transport implementation.
//!
//! A REST surface over the shared [`Dispatcher`] plus a stateless JSON-RPC
//! endpoint, so standard HTTP clients (curl, browsers, etc.) can use the
//! server. There is no handshake over HTTP: every request is served as if the
//! session were already ready.

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

use super::{HttpConfig, TransportError, TransportResult, shutdown_requested};
use crate::core::dispatcher::{Dispatch, Dispatcher};
use crate::core::error::ErrorRecord;
use crate::core::jsonrpc::JsonRpcResponse;
use crate::core::session::Session;
use crate::domains::tools::definitions::{SearchByKrsTool, SearchByNipTool, SearchByRegonTool};

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
    grace: Duration,
}

/// Application state shared across HTTP handlers.
#[derive(Clone)]
struct AppState {
    dispatcher: Dispatcher,
    rpc_path: String,
}

/// Body of `POST /tools/call`.
#[derive(Debug, Deserialize)]
struct CallRequest {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl HttpTransport {
    /// Create a new HTTP transport. `grace` bounds the connection drain on shutdown.
    pub fn new(config: HttpConfig, grace: Duration) -> Self {
        Self { config, grace }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Run the HTTP transport until shutdown is signalled.
    pub async fn run(
        &self,
        dispatcher: Dispatcher,
        shutdown: watch::Receiver<bool>,
    ) -> TransportResult<()> {
        let addr = self.address();
        let app = router(dispatcher, &self.config);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        let cors_status = if self.config.enable_cors {
            "enabled"
        } else {
            "disabled"
        };
        info!("Ready - listening on {} (CORS {})", addr, cors_status);
        info!("  → JSON-RPC: POST {}", self.config.rpc_path);
        info!("  → Tools:    GET /tools, POST /tools/call");
        info!("  → Search:   GET /search/{{nip,krs,regon}}/{{value}}");
        info!("  → Health:   GET /health");

        let mut stop = shutdown.clone();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown_requested(&mut stop).await })
            .into_future();
        tokio::pin!(server);

        let mut deadline = shutdown;
        let grace = self.grace;
        tokio::select! {
            result = &mut server => {
                result.map_err(|e| TransportError::http(e.to_string()))?;
            }
            _ = async {
                shutdown_requested(&mut deadline).await;
                tokio::time::sleep(grace).await;
            } => {
                warn!("Open connections still busy after {:?}; closing them", grace);
            }
        }

        info!("HTTP transport finished");
        Ok(())
    }
}

/// Build the router for the HTTP surface.
pub fn router(dispatcher: Dispatcher, config: &HttpConfig) -> Router {
    let state = AppState {
        dispatcher,
        rpc_path: config.rpc_path.clone(),
    };

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/tools", get(list_tools))
        .route("/tools/call", post(call_tool))
        .route("/search/nip/{nip}", get(search_by_nip))
        .route("/search/krs/{krs}", get(search_by_krs))
        .route("/search/regon/{regon}", get(search_by_regon));

    // Mounting an unusable path would panic inside axum
    let app = match config.validate() {
        Ok(()) => app.route(&config.rpc_path, post(handle_rpc)),
        Err(e) => {
            error!("JSON-RPC endpoint not mounted: {}", e);
            app
        }
    };

    let mut app = app
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Render an error record with the status its kind maps to.
fn error_response(state: &AppState, record: &ErrorRecord) -> Response {
    let status =
        StatusCode::from_u16(record.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({ "error": record.to_json(state.dispatcher.detailed_errors()) });
    (status, Json(body)).into_response()
}

fn rejection_record(rejection: &JsonRejection) -> ErrorRecord {
    ErrorRecord::validation(format!("Invalid request body: {}", rejection.body_text()))
}

/// Root handler - provides API info.
async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.dispatcher.config();
    Json(json!({
        "name": config.server.name,
        "version": config.server.version,
        "mode": if config.production { "production" } else { "test" },
        "transport": "HTTP",
        "endpoints": {
            "rpc": state.rpc_path,
            "health": "/health",
            "tools": "/tools",
            "call": "/tools/call",
            "search": ["/search/nip/{nip}", "/search/krs/{krs}", "/search/regon/{regon}"]
        },
        "tools": state.dispatcher.registry().summary(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Health check endpoint. Probes the registry service status.
#[instrument(skip_all)]
async fn health_check(State(state): State<AppState>) -> Response {
    let ctx = state.dispatcher.context();
    let probe = ctx
        .policies
        .health
        .run("health check", || ctx.client.service_status())
        .await;

    match probe {
        Ok(status) => Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "checks": {
                "registry": {
                    "reachable": true,
                    "code": status.code,
                    "message": status.message,
                },
                "tools": state.dispatcher.registry().len(),
            }
        }))
        .into_response(),
        Err(record) => {
            warn!("Health check failed: {}", record);
            let status = StatusCode::from_u16(record.http_status())
                .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
            let body = json!({
                "status": "unhealthy",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "error": record.to_json(state.dispatcher.detailed_errors()),
            });
            (status, Json(body)).into_response()
        }
    }
}

async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    let tools = state.dispatcher.registry().tools();
    let count = tools.len();
    Json(json!({ "tools": tools, "count": count }))
}

async fn call_tool(
    State(state): State<AppState>,
    body: Result<Json<CallRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(request)) => invoke(&state, &request.name, request.arguments).await,
        Err(rejection) => error_response(&state, &rejection_record(&rejection)),
    }
}

async fn search_by_nip(State(state): State<AppState>, Path(nip): Path<String>) -> Response {
    invoke(&state, SearchByNipTool::NAME, json!({ "nip": nip })).await
}

async fn search_by_krs(State(state): State<AppState>, Path(krs): Path<String>) -> Response {
    invoke(&state, SearchByKrsTool::NAME, json!({ "krs": krs })).await
}

async fn search_by_regon(State(state): State<AppState>, Path(regon): Path<String>) -> Response {
    invoke(&state, SearchByRegonTool::NAME, json!({ "regon": regon })).await
}

#[instrument(skip(state, arguments))]
async fn invoke(state: &AppState, name: &str, arguments: Value) -> Response {
    match state.dispatcher.call_tool(name, arguments).await {
        Ok(result) => Json(result).into_response(),
        Err(record) => error_response(state, &record),
    }
}

/// Handle JSON-RPC requests.
///
/// Stateless: `initialize` is answered from a fresh session, every other
/// method runs against a ready one.
async fn handle_rpc(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let value = match body {
        Ok(Json(value)) => value,
        Err(rejection) => {
            let response = JsonRpcResponse::parse_error(rejection.body_text());
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let session = if value.get("method").and_then(Value::as_str) == Some("initialize") {
        Session::new()
    } else {
        Session::ready()
    };

    match state.dispatcher.dispatch_value(&session, value) {
        Dispatch::Reply(Some(response)) => Json(response).into_response(),
        Dispatch::Reply(None) => StatusCode::ACCEPTED.into_response(),
        Dispatch::Deferred(call) => Json(state.dispatcher.complete(call).await).into_response(),
    }
}
