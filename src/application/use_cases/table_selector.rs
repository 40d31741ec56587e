//! Asks the model which tables a question needs.
//!
//! Every failure path falls back to the full table list, so a bad answer here
//! costs prompt size, never the query.

use super::prompt_factory::PromptFactory;
use crate::domain::schema::{SchemaItem, TableSelection};
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::{clean_llm_response, extract_json_object, strip_code_fence};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TableSelectionReply {
    tables: Vec<serde_json::Value>,
}

pub struct TableSelector {
    llm: Arc<dyn LLMClient>,
    prompts: PromptFactory,
}

impl TableSelector {
    pub fn new(llm: Arc<dyn LLMClient>, prompts: PromptFactory) -> Self {
        Self { llm, prompts }
    }

    pub async fn select(
        &self,
        user_query: &str,
        items: &[SchemaItem],
        today: NaiveDate,
    ) -> TableSelection {
        let available = self.prompts.formatter().table_names(items);
        let fallback = || TableSelection::from_names(&available);

        let prompt = self.prompts.table_selection_prompt(user_query, items, today);
        let raw = match self.llm.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("[TableSelector] Generation failed, using all tables: {}", e);
                return fallback();
            }
        };
        debug!("[TableSelector] Raw reply: {}", raw);

        let Some(names) = parse_table_names(&raw) else {
            warn!("[TableSelector] Unparseable reply, using all tables");
            return fallback();
        };

        let valid: Vec<&String> = names
            .iter()
            .filter_map(|name| {
                available
                    .iter()
                    .find(|table| table.eq_ignore_ascii_case(name.trim()))
            })
            .collect();

        if valid.is_empty() {
            warn!(
                "[TableSelector] No known tables in reply {:?}, using all tables",
                names
            );
            return fallback();
        }

        let selection = TableSelection::from_names(valid);
        info!("[TableSelector] Selected tables: {:?}", selection.tables());
        selection
    }
}

/// `None` when the reply has no usable `tables` array.
fn parse_table_names(raw: &str) -> Option<Vec<String>> {
    let cleaned = strip_code_fence(&clean_llm_response(raw));
    let json = extract_json_object(&cleaned)?;
    let reply: TableSelectionReply = serde_json::from_str(json).ok()?;

    let names: Vec<String> = reply
        .tables
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect();

    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::schema_formatter::SchemaFormatter;
    use crate::domain::error::{AppError, Result};
    use crate::domain::pipeline_config::SqlDialect;
    use crate::domain::schema::ColumnMeta;
    use async_trait::async_trait;

    struct CannedClient(std::result::Result<String, String>);

    #[async_trait]
    impl LLMClient for CannedClient {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.0.clone().map_err(AppError::LLMError)
        }

        fn describe(&self) -> String {
            "canned/test".to_string()
        }
    }

    fn selector(reply: std::result::Result<&str, &str>) -> TableSelector {
        let client = CannedClient(reply.map(str::to_string).map_err(str::to_string));
        TableSelector::new(
            Arc::new(client),
            PromptFactory::new(SchemaFormatter::new(), SqlDialect::Postgres),
        )
    }

    fn items() -> Vec<SchemaItem> {
        ["patients", "prescriptions", "medications"]
            .iter()
            .map(|name| SchemaItem::new("public", name, vec![ColumnMeta::new("id", "integer")]))
            .collect()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    async fn run(reply: std::result::Result<&str, &str>) -> Vec<String> {
        selector(reply)
            .select("Which medications did patient 3 get?", &items(), today())
            .await
            .tables()
            .to_vec()
    }

    #[tokio::test]
    async fn test_plain_json_reply() {
        assert_eq!(
            run(Ok(r#"{"tables": ["Prescriptions", "medications"]}"#)).await,
            vec!["prescriptions", "medications"]
        );
    }

    #[tokio::test]
    async fn test_fenced_reply_with_prose() {
        let reply = "Here are the tables:\n```json\n{\"tables\": [\"patients\"]}\n```";
        assert_eq!(run(Ok(reply)).await, vec!["patients"]);
    }

    #[tokio::test]
    async fn test_unknown_names_dropped_and_duplicates_folded() {
        assert_eq!(
            run(Ok(r#"{"tables": ["ghosts", "PATIENTS", "patients"]}"#)).await,
            vec!["patients"]
        );
    }

    #[tokio::test]
    async fn test_fail_open_paths() {
        let all = vec!["patients", "prescriptions", "medications"];
        assert_eq!(run(Ok("I think you need patients")).await, all);
        assert_eq!(run(Ok(r#"{"tables": []}"#)).await, all);
        assert_eq!(run(Ok(r#"{"table": ["patients"]}"#)).await, all);
        assert_eq!(run(Ok(r#"{"tables": ["ghosts"]}"#)).await, all);
        assert_eq!(run(Err("connection refused")).await, all);
    }
}
