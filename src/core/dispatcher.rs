//! Request dispatcher.
//!
//! Turns validated JSON-RPC messages into responses. Session gating happens
//! synchronously in [`Dispatcher::dispatch`] so it follows arrival order;
//! tool execution is returned as a [`PendingCall`] the transport may run
//! concurrently.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use rmcp::model::{CallToolResult, JsonObject, ServerCapabilities};
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};

use super::config::Config;
use super::error::{ErrorRecord, panic_message};
use super::jsonrpc::{Incoming, JsonRpcResponse};
use super::session::Session;
use crate::domains::tools::schema::{sanitize_arguments, validate_arguments};
use crate::domains::tools::{ToolContext, ToolRegistry};

/// Outcome of admitting one message.
#[derive(Debug)]
pub enum Dispatch {
    /// Fully handled; `None` for notifications.
    Reply(Option<JsonRpcResponse>),
    /// An admitted tool call still to be executed.
    Deferred(PendingCall),
}

/// A `tools/call` request that passed session and envelope checks.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub id: Value,
    pub name: String,
    pub arguments: Value,
}

struct Inner {
    registry: ToolRegistry,
    context: ToolContext,
    config: Arc<Config>,
}

/// Shared request dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry, context: ToolContext, config: Arc<Config>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                context,
                config,
            }),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.inner.registry
    }

    pub fn context(&self) -> &ToolContext {
        &self.inner.context
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Whether error bodies may carry real messages and cause chains.
    pub fn detailed_errors(&self) -> bool {
        !self.inner.config.production
    }

    /// Admit one raw line of input.
    pub fn dispatch_line(&self, session: &Session, line: &str) -> Dispatch {
        match Incoming::parse(line) {
            Ok(message) => self.dispatch(session, message),
            Err(response) => {
                debug!("Rejected malformed message: {:?}", response.error);
                Dispatch::Reply(Some(response))
            }
        }
    }

    /// Admit one decoded JSON value.
    pub fn dispatch_value(&self, session: &Session, value: Value) -> Dispatch {
        match Incoming::from_value(value) {
            Ok(message) => self.dispatch(session, message),
            Err(response) => Dispatch::Reply(Some(response)),
        }
    }

    /// Admit one message.
    #[instrument(skip_all, fields(method = %message.method()))]
    pub fn dispatch(&self, session: &Session, message: Incoming) -> Dispatch {
        let (id, method, params) = match message {
            Incoming::Notification { method, params } => {
                self.handle_notification(session, &method, &params);
                return Dispatch::Reply(None);
            }
            Incoming::Request { id, method, params } => (id, method, params),
        };

        let response = match method.as_str() {
            "initialize" => self.handle_initialize(session, id, &params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => match session.require_ready() {
                Ok(()) => JsonRpcResponse::success(id, self.list_tools()),
                Err(e) => JsonRpcResponse::from_record(id, &e, self.detailed_errors()),
            },
            "tools/call" => {
                if let Err(e) = session.require_ready() {
                    return Dispatch::Reply(Some(JsonRpcResponse::from_record(
                        id,
                        &e,
                        self.detailed_errors(),
                    )));
                }
                return match admit_call(id.clone(), params) {
                    Ok(call) => Dispatch::Deferred(call),
                    Err(msg) => Dispatch::Reply(Some(JsonRpcResponse::invalid_params(id, msg))),
                };
            }
            other => {
                debug!("Unknown method: {}", other);
                JsonRpcResponse::method_not_found(id, other)
            }
        };

        Dispatch::Reply(Some(response))
    }

    /// Execute an admitted tool call.
    pub async fn complete(&self, call: PendingCall) -> JsonRpcResponse {
        let PendingCall {
            id,
            name,
            arguments,
        } = call;

        match self.call_tool(&name, arguments).await {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => JsonRpcResponse::internal_error(
                    id,
                    format!("Failed to serialize tool result: {}", e),
                ),
            },
            Err(record) => JsonRpcResponse::from_record(id, &record, self.detailed_errors()),
        }
    }

    /// Admit and, if needed, execute one message inline.
    pub async fn handle(&self, session: &Session, message: Incoming) -> Option<JsonRpcResponse> {
        match self.dispatch(session, message) {
            Dispatch::Reply(reply) => reply,
            Dispatch::Deferred(call) => Some(self.complete(call).await),
        }
    }

    /// Invoke a tool by name.
    ///
    /// Arguments are checked against the tool's input schema and sanitized
    /// before the handler runs. Handler panics become internal errors.
    #[instrument(skip(self, arguments))]
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ErrorRecord> {
        let tool = self
            .inner
            .registry
            .get(name)
            .ok_or_else(|| ErrorRecord::not_found(format!("Unknown tool: {}", name)))?;

        let arguments: JsonObject = match arguments {
            Value::Null => JsonObject::new(),
            Value::Object(map) => map,
            _ => {
                return Err(ErrorRecord::validation(
                    "Tool arguments must be a JSON object",
                ));
            }
        };

        validate_arguments(&tool.descriptor.input_schema, &arguments)?;
        let arguments = sanitize_arguments(arguments);

        let handler = tool.handler.clone();
        let ctx = self.inner.context.clone();
        let started = Instant::now();

        let outcome = AssertUnwindSafe(async move { handler.execute(&ctx, arguments).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => {
                info!("Tool {} completed in {:?}", name, started.elapsed());
                Ok(result)
            }
            Ok(Err(record)) => {
                warn!("Tool {} failed: {}", name, record);
                Err(record)
            }
            Err(panic) => {
                let detail = panic_message(&*panic);
                error!("Tool {} panicked: {}", name, detail);
                Err(ErrorRecord::internal(format!(
                    "Tool '{}' failed unexpectedly: {}",
                    name, detail
                )))
            }
        }
    }

    /// The `tools/list` result.
    pub fn list_tools(&self) -> Value {
        json!({ "tools": self.inner.registry.tools() })
    }

    fn handle_initialize(&self, session: &Session, id: Value, params: &Value) -> JsonRpcResponse {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let client_info = params.get("clientInfo").cloned();

        match session.begin_initialize(requested, client_info) {
            Ok(version) => {
                let client_name = params
                    .pointer("/clientInfo/name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                info!(
                    "Client initializing (protocol {}, client {})",
                    version, client_name
                );
                JsonRpcResponse::success(id, self.initialize_result(&version))
            }
            Err(e) => {
                warn!("Rejected initialize: {}", e.message());
                JsonRpcResponse::invalid_request(id, e.message())
            }
        }
    }

    fn initialize_result(&self, protocol_version: &str) -> Value {
        let config = &self.inner.config;
        let registry = &self.inner.registry;
        let instructions = format!(
            "Search the Polish GUS REGON business registry by NIP, REGON or KRS, \
             download full BIR 1.1 reports and check service status. \
             {} tools available ({} mode).",
            registry.len(),
            if config.production {
                "production"
            } else {
                "test"
            }
        );

        json!({
            "protocolVersion": protocol_version,
            "capabilities": ServerCapabilities::builder().enable_tools().build(),
            "serverInfo": {
                "name": config.server.name,
                "version": config.server.version,
            },
            "instructions": instructions,
            "toolSummary": registry.summary(),
        })
    }

    fn handle_notification(&self, session: &Session, method: &str, _params: &Value) {
        match method {
            "notifications/initialized" => {
                if !session.mark_ready() {
                    warn!(
                        "Ignoring notifications/initialized in state {:?}",
                        session.state()
                    );
                }
            }
            "notifications/cancelled" => {
                debug!("Cancellation notifications are not supported; ignoring");
            }
            "initialize" | "ping" | "tools/list" | "tools/call" => {
                warn!("Ignoring {} sent without an id", method);
            }
            other => {
                debug!("Ignoring unknown notification: {}", other);
            }
        }
    }
}

fn admit_call(id: Value, params: Value) -> Result<PendingCall, &'static str> {
    let Value::Object(mut params) = params else {
        return Err("tools/call params must be an object");
    };
    let name = match params.remove("name") {
        Some(Value::String(name)) => name,
        _ => return Err("tools/call params must include a string 'name'"),
    };
    let arguments = params.remove("arguments").unwrap_or(Value::Null);
    Ok(PendingCall {
        id,
        name,
        arguments,
    })
}
