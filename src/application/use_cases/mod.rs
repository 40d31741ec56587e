pub mod evaluator;
pub mod nl2sql_pipeline;
pub mod prompt_factory;
pub mod result_comparator;
pub mod retry_controller;
pub mod schema_formatter;
pub mod schema_reducer;
pub mod sql_generator;
pub mod table_selector;
