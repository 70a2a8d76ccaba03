//! Full report download for one entity.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, JsonObject, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use super::common::{descriptor, parse_params, records_result};
use crate::core::error::ErrorRecord;
use crate::core::security::validate_digits;
use crate::domains::regon::AVAILABLE_REPORTS;
use crate::domains::tools::{ToolContext, ToolHandler};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FullReportParams {
    #[schemars(description = "9 or 14-digit REGON number")]
    pub regon: String,

    #[schemars(description = "BIR 1.1 report name (e.g., 'BIR11OsPrawna')")]
    pub report_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct FullReportTool;

impl FullReportTool {
    pub const NAME: &'static str = "regon_get_full_report";

    pub const DESCRIPTION: &'static str = "Get a detailed report for a Polish company by REGON number. Report names follow BIR 1.1 (e.g., BIR11OsPrawna for legal entities, BIR11OsFizycznaDaneOgolne for natural persons).";

    pub fn to_tool() -> Tool {
        descriptor::<FullReportParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for FullReportTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> Tool {
        Self::to_tool()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord> {
        let params: FullReportParams = parse_params(arguments)?;
        let regon = validate_digits("REGON", &params.regon, &[9, 14])?;
        let report = params.report_name.trim();

        if !AVAILABLE_REPORTS.contains(&report) {
            return Err(ErrorRecord::validation(format!(
                "Invalid report name. Available: {}",
                AVAILABLE_REPORTS.join(", ")
            )));
        }

        debug!("Getting full report for REGON {}, report: {}", regon, report);
        let records = ctx
            .policies
            .report
            .run("full report", || ctx.client.full_report(&regon, report))
            .await?;

        Ok(records_result(
            records,
            "No report data available for the specified parameters.",
        ))
    }
}
