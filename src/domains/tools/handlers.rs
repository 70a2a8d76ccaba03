//! Tool handler contract.
//!
//! Every tool is a [`ToolHandler`]: a name, a built-in descriptor and an
//! async `execute`. Handlers receive arguments that were already checked
//! against the descriptor's input schema and sanitized.

use std::sync::Arc;

use rmcp::model::{CallToolResult, JsonObject, Tool};

use crate::core::error::ErrorRecord;
use crate::core::retry::RetryPolicies;
use crate::domains::regon::RegistryClient;

/// Shared dependencies handed to every tool call.
#[derive(Clone)]
pub struct ToolContext {
    /// Business-registry collaborator.
    pub client: Arc<dyn RegistryClient>,

    /// Retry policies, one per operation type.
    pub policies: Arc<RetryPolicies>,
}

impl ToolContext {
    pub fn new(client: Arc<dyn RegistryClient>, policies: RetryPolicies) -> Self {
        Self {
            client,
            policies: Arc::new(policies),
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

/// Trait implemented by every tool.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the name of this tool.
    fn name(&self) -> &str;

    /// Descriptor used when no catalog file describes this tool.
    fn descriptor(&self) -> Tool;

    /// Execute the tool with validated, sanitized arguments.
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord>;
}
