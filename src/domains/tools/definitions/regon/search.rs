//! Single-entity registry searches by NIP, REGON or KRS.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, JsonObject, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::common::{descriptor, parse_params, records_result};
use crate::core::error::ErrorRecord;
use crate::core::security::validate_digits;
use crate::domains::regon::SearchKey;
use crate::domains::tools::{ToolContext, ToolHandler};

/// Parameters for a NIP search.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NipSearchParams {
    #[schemars(description = "10-digit NIP number (e.g., '7342867148')")]
    pub nip: String,
}

/// Parameters for a REGON search.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RegonSearchParams {
    #[schemars(description = "9-digit (main unit) or 14-digit (local unit) REGON number")]
    pub regon: String,
}

/// Parameters for a KRS search.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct KrsSearchParams {
    #[schemars(description = "10-digit KRS number with leading zeros (e.g., '0000006865')")]
    pub krs: String,
}

async fn run_search(
    ctx: &ToolContext,
    key: SearchKey,
    empty_message: &str,
) -> Result<CallToolResult, ErrorRecord> {
    debug!("Searching registry by {}: {}", key.parameter(), key.value());
    let operation = format!("search by {}", key.parameter());
    let records = ctx
        .policies
        .search
        .run(&operation, || ctx.client.search(&key))
        .await?;
    Ok(records_result(records, empty_message))
}

/// Search by tax identification number.
#[derive(Debug, Clone, Default)]
pub struct SearchByNipTool;

impl SearchByNipTool {
    pub const NAME: &'static str = "regon_search_by_nip";

    pub const DESCRIPTION: &'static str = "Search for Polish companies by NIP (tax number). Separators such as dashes and spaces are ignored.";

    pub fn to_tool() -> Tool {
        descriptor::<NipSearchParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for SearchByNipTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> Tool {
        Self::to_tool()
    }

    #[instrument(skip_all, name = "regon_search_by_nip")]
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord> {
        let params: NipSearchParams = parse_params(arguments)?;
        let nip = validate_digits("NIP", &params.nip, &[10])?;
        run_search(
            ctx,
            SearchKey::Nip(nip),
            "No data found for the specified NIP number.",
        )
        .await
    }
}

/// Search by statistical number.
#[derive(Debug, Clone, Default)]
pub struct SearchByRegonTool;

impl SearchByRegonTool {
    pub const NAME: &'static str = "regon_search_by_regon";

    pub const DESCRIPTION: &'static str =
        "Search for Polish companies by REGON number (9 digits for main units, 14 for local units).";

    pub fn to_tool() -> Tool {
        descriptor::<RegonSearchParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for SearchByRegonTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> Tool {
        Self::to_tool()
    }

    #[instrument(skip_all, name = "regon_search_by_regon")]
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord> {
        let params: RegonSearchParams = parse_params(arguments)?;
        let regon = validate_digits("REGON", &params.regon, &[9, 14])?;
        run_search(
            ctx,
            SearchKey::Regon(regon),
            "No data found for the specified REGON number.",
        )
        .await
    }
}

/// Search by National Court Register number.
#[derive(Debug, Clone, Default)]
pub struct SearchByKrsTool;

impl SearchByKrsTool {
    pub const NAME: &'static str = "regon_search_by_krs";

    pub const DESCRIPTION: &'static str =
        "Search for Polish companies by KRS (court register) number.";

    pub fn to_tool() -> Tool {
        descriptor::<KrsSearchParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for SearchByKrsTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn descriptor(&self) -> Tool {
        Self::to_tool()
    }

    #[instrument(skip_all, name = "regon_search_by_krs")]
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorRecord> {
        let params: KrsSearchParams = parse_params(arguments)?;
        let krs = validate_digits("KRS", &params.krs, &[10])?;
        run_search(
            ctx,
            SearchKey::Krs(krs),
            "No data found for the specified KRS number.",
        )
        .await
    }
}
