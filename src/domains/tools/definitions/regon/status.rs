//! Service, data and session status lookups.
//!
//! None of these tools takes arguments.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, JsonObject, Tool};
use serde_json::json;
use tracing::debug;

use super::common::{NoParams, descriptor, text_result};
use crate::core::error::ErrorRecord;
use crate::domains::regon::StatusReport;
use crate::domains::tools::{ToolContext, ToolHandler};

fn with_structured(mut result: CallToolResult, value: serde_json::Value) -> CallToolResult {
    result.structured_content = Some(value);
    result
}

fn status_result(text: String, report: &StatusReport) -> CallToolResult {
    with_structured(
        text_result(text),
        json!({"code": report.code, "message": report.message}),
    )
}

#[derive(Debug, Clone, Default)]
pub struct ServiceStatusTool;

impl ServiceStatusTool {
    pub const NAME: &'static str = "regon_get_service_status";

    pub const DESCRIPTION: &'static str = "Check the status of the REGON service";

    pub fn to_tool() -> Tool {
        descriptor::<NoParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for ServiceStatusTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> Tool {
        Self::to_tool()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord> {
        debug!("Getting service status");
        let report = ctx
            .policies
            .status
            .run("service status", || ctx.client.service_status())
            .await?;
        let text = format!(
            "Service Status Code: {}\nStatus Message: {}",
            report.code, report.message
        );
        Ok(status_result(text, &report))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataStatusTool;

impl DataStatusTool {
    pub const NAME: &'static str = "regon_get_data_status";

    pub const DESCRIPTION: &'static str =
        "Get the date of the registry data snapshot served by the REGON service";

    pub fn to_tool() -> Tool {
        descriptor::<NoParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for DataStatusTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> Tool {
        Self::to_tool()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord> {
        debug!("Getting data status");
        let status = ctx
            .policies
            .status
            .run("data status", || ctx.client.data_status())
            .await?;
        Ok(match status {
            Some(date) => with_structured(
                text_result(format!("Data Status: {}", date)),
                json!({ "data_status": date }),
            ),
            None => text_result("No data status information available."),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LastErrorCodeTool;

impl LastErrorCodeTool {
    pub const NAME: &'static str = "regon_get_last_error_code";

    pub const DESCRIPTION: &'static str =
        "Get the code and message of the last REGON service operation";

    pub fn to_tool() -> Tool {
        descriptor::<NoParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for LastErrorCodeTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> Tool {
        Self::to_tool()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord> {
        let report = ctx
            .policies
            .status
            .run("last error code", || ctx.client.last_code())
            .await?;
        let text = format!(
            "Last Error Code: {}\nMessage: {}",
            report.code, report.message
        );
        Ok(status_result(text, &report))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LastErrorMessageTool;

impl LastErrorMessageTool {
    pub const NAME: &'static str = "regon_get_last_error_message";

    pub const DESCRIPTION: &'static str =
        "Get the message of the last REGON service operation";

    pub fn to_tool() -> Tool {
        descriptor::<NoParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for LastErrorMessageTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> Tool {
        Self::to_tool()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord> {
        let report = ctx
            .policies
            .status
            .run("last error message", || ctx.client.last_code())
            .await?;
        let text = format!("Last Error Message: {}", report.message);
        Ok(status_result(text, &report))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionStatusTool;

impl SessionStatusTool {
    pub const NAME: &'static str = "regon_get_session_status";

    pub const DESCRIPTION: &'static str = "Check whether the REGON service session is active";

    pub fn to_tool() -> Tool {
        descriptor::<NoParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for SessionStatusTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> Tool {
        Self::to_tool()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord> {
        let report = ctx
            .policies
            .status
            .run("session status", || ctx.client.session_status())
            .await?;
        let text = format!("Session Status: {} (Code: {})", report.message, report.code);
        Ok(status_result(text, &report))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AvailableOperationsTool;

impl AvailableOperationsTool {
    pub const NAME: &'static str = "regon_get_available_operations";

    pub const DESCRIPTION: &'static str = "List the operations offered by the REGON service";

    pub fn to_tool() -> Tool {
        descriptor::<NoParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for AvailableOperationsTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> Tool {
        Self::to_tool()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord> {
        let operations = ctx.client.operations();
        if operations.is_empty() {
            return Ok(text_result("No operations information available."));
        }
        let text = serde_json::to_string_pretty(&operations)
            .map_err(|e| ErrorRecord::internal(e.to_string()))?;
        Ok(with_structured(
            text_result(text),
            json!({ "operations": operations }),
        ))
    }
}
