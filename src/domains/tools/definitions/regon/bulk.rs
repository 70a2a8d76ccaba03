//! Batch searches (up to 20 identifiers per call).

use async_trait::async_trait;
use rmcp::model::{CallToolResult, JsonObject, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use super::common::{descriptor, filter_batch, parse_params, records_result};
use crate::core::error::ErrorRecord;
use crate::domains::regon::SearchKey;
use crate::domains::tools::{ToolContext, ToolHandler};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MultipleNipsParams {
    #[schemars(description = "List of 10-digit NIP numbers (maximum 20)")]
    pub nips: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MultipleRegonsParams {
    #[schemars(description = "List of 9-digit REGON numbers (maximum 20)")]
    pub regons: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MultipleKrsParams {
    #[schemars(description = "List of 10-digit KRS numbers (maximum 20)")]
    pub krs_numbers: Vec<String>,
}

async fn run_batch(ctx: &ToolContext, key: SearchKey) -> Result<CallToolResult, ErrorRecord> {
    debug!("Batch search by {}: {}", key.parameter(), key.value());
    let operation = format!("batch search by {}", key.parameter());
    let records = ctx
        .policies
        .search
        .run(&operation, || ctx.client.search(&key))
        .await?;
    Ok(records_result(
        records,
        "No data found for any of the specified numbers.",
    ))
}

#[derive(Debug, Clone, Default)]
pub struct SearchMultipleNipsTool;

impl SearchMultipleNipsTool {
    pub const NAME: &'static str = "regon_search_multiple_nips";

    pub const DESCRIPTION: &'static str = "Search for multiple Polish companies by NIP numbers at once. Invalid numbers are skipped.";

    pub fn to_tool() -> Tool {
        descriptor::<MultipleNipsParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for SearchMultipleNipsTool {
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
        let params: MultipleNipsParams = parse_params(arguments)?;
        let nips = filter_batch("NIP", &params.nips, &[10])?;
        run_batch(ctx, SearchKey::Nips(nips)).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchMultipleRegons9Tool;

impl SearchMultipleRegons9Tool {
    pub const NAME: &'static str = "regon_search_multiple_regons9";

    pub const DESCRIPTION: &'static str = "Search for multiple Polish companies by 9-digit REGON numbers at once. Invalid numbers are skipped.";

    pub fn to_tool() -> Tool {
        descriptor::<MultipleRegonsParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for SearchMultipleRegons9Tool {
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
        let params: MultipleRegonsParams = parse_params(arguments)?;
        let regons = filter_batch("REGON", &params.regons, &[9])?;
        run_batch(ctx, SearchKey::Regons9(regons)).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchMultipleKrsTool;

impl SearchMultipleKrsTool {
    pub const NAME: &'static str = "regon_search_multiple_krs";

    pub const DESCRIPTION: &'static str = "Search for multiple Polish companies by KRS numbers at once. Invalid numbers are skipped.";

    pub fn to_tool() -> Tool {
        descriptor::<MultipleKrsParams>(Self::NAME, Self::DESCRIPTION)
    }
}

#[async_trait]
impl ToolHandler for SearchMultipleKrsTool {
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
        let params: MultipleKrsParams = parse_params(arguments)?;
        let krs = filter_batch("KRS", &params.krs_numbers, &[10])?;
        run_batch(ctx, SearchKey::Krss(krs)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::retry::RetryPolicies;
    use crate::domains::regon::testing::ScriptedClient;
    use serde_json::json;
    use std::sync::Arc;

    fn args(value: serde_json::Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_invalid_entries_are_skipped() {
        let client = Arc::new(ScriptedClient::new());
        let ctx = ToolContext::new(client.clone(), RetryPolicies::default());

        SearchMultipleNipsTool
            .execute(
                &ctx,
                args(json!({"nips": ["5261040828", "bad", "7342867148"]})),
            )
            .await
            .unwrap();

        assert_eq!(
            client.searched_keys(),
            vec![SearchKey::Nips(vec![
                "5261040828".to_string(),
                "7342867148".to_string()
            ])]
        );
    }

    #[tokio::test]
    async fn test_regons9_rejects_14_digit_entries() {
        let client = Arc::new(ScriptedClient::new());
        let ctx = ToolContext::new(client.clone(), RetryPolicies::default());

        let err = SearchMultipleRegons9Tool
            .execute(&ctx, args(json!({"regons": ["12345678901234"]})))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(client.data_calls(), 0);
    }

    #[tokio::test]
    async fn test_krs_batch_limit() {
        let client = Arc::new(ScriptedClient::new());
        let ctx = ToolContext::new(client.clone(), RetryPolicies::default());
        let numbers: Vec<String> = (0..25).map(|i| format!("{:010}", i)).collect();

        let err = SearchMultipleKrsTool
            .execute(&ctx, args(json!({ "krs_numbers": numbers })))
            .await
            .unwrap_err();

        assert!(err.message().contains("Maximum 20"));
    }
}
