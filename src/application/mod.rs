pub mod use_cases;

pub use use_cases::evaluator::{Evaluator, GoldEchoPredictor, SqlPredictor};
pub use use_cases::nl2sql_pipeline::Nl2SqlPipeline;
pub use use_cases::prompt_factory::{PromptFactory, RetryFeedback};
pub use use_cases::result_comparator::{normalize_sql, results_equal};
pub use use_cases::retry_controller::{
    AttemptOutcome, AttemptRecord, PipelineOutcome, RetryController,
};
pub use use_cases::schema_formatter::SchemaFormatter;
pub use use_cases::schema_reducer::SchemaReducer;
pub use use_cases::sql_generator::SqlGenerator;
pub use use_cases::table_selector::TableSelector;
