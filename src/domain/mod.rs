pub mod error;
pub mod evaluation;
pub mod llm_config;
pub mod pipeline_config;
pub mod schema;
pub mod sql;
