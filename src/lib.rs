//! Schema-grounded natural-language-to-SQL generation with an error-driven
//! retry loop, plus an evaluator that scores generated SQL against a gold set.

pub mod app;
pub mod application;
pub mod domain;
pub mod infrastructure;

pub use app::run;
pub use application::{
    Evaluator, GoldEchoPredictor, Nl2SqlPipeline, PipelineOutcome, SqlPredictor,
};
pub use domain::error::{AppError, Result};
pub use domain::evaluation::{EvalCaseResult, EvalReport, EvalSummary, GoldSet, Verdict};
pub use domain::pipeline_config::{AppConfig, DatabaseConfig, ExplainPolicy, PipelineConfig};
pub use infrastructure::db::{DatabasePool, QueryExecutor, SchemaCatalog, SqlxQueryExecutor};
pub use infrastructure::llm_clients::{build_llm_client, LLMClient};

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber once. `RUST_LOG` wins over `default_level`.
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
