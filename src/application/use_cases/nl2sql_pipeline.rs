use super::prompt_factory::PromptFactory;
use super::retry_controller::{PipelineOutcome, RetryController};
use super::schema_formatter::SchemaFormatter;
use super::schema_reducer::SchemaReducer;
use super::sql_generator::SqlGenerator;
use super::table_selector::TableSelector;
use crate::domain::error::Result;
use crate::domain::pipeline_config::PipelineConfig;
use crate::infrastructure::db::{QueryExecutor, SchemaCatalog};
use crate::infrastructure::llm_clients::LLMClient;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

/// Question in, executed SQL out.
///
/// Holds no per-question state, so one instance can serve concurrent callers.
pub struct Nl2SqlPipeline {
    catalog: Arc<dyn SchemaCatalog>,
    selector: TableSelector,
    reducer: SchemaReducer,
    formatter: SchemaFormatter,
    retry: RetryController,
}

impl Nl2SqlPipeline {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        executor: Arc<dyn QueryExecutor>,
        catalog: Arc<dyn SchemaCatalog>,
        config: &PipelineConfig,
    ) -> Self {
        let formatter = SchemaFormatter::new();
        let prompts = PromptFactory::new(formatter, executor.dialect());

        Self {
            catalog,
            selector: TableSelector::new(llm.clone(), prompts.clone()),
            reducer: SchemaReducer::new(),
            formatter,
            retry: RetryController::new(SqlGenerator::new(llm), executor, prompts, config),
        }
    }

    pub async fn run(&self, user_query: &str) -> Result<PipelineOutcome> {
        self.run_on(user_query, chrono::Local::now().date_naive())
            .await
    }

    /// Same as [`run`](Self::run) with an explicit "current date" for the prompts.
    pub async fn run_on(&self, user_query: &str, today: NaiveDate) -> Result<PipelineOutcome> {
        info!("[Pipeline] Question: {}", user_query);

        let items = self.catalog.inspect().await?;
        let selection = self.selector.select(user_query, &items, today).await;
        let reduced = self.reducer.reduce(&items, &selection);
        let schema_text = self.formatter.to_text(&reduced);

        let outcome = self.retry.run(user_query, &schema_text).await?;
        info!(
            "[Pipeline] Finished after {} attempt(s), done={}",
            outcome.attempts().len(),
            outcome.is_done()
        );
        Ok(outcome)
    }
}
