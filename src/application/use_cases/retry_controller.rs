//! Generate, execute, and regenerate with the database's complaint until a
//! statement runs or the attempt budget is spent.

use super::prompt_factory::{PromptFactory, RetryFeedback};
use super::sql_generator::SqlGenerator;
use crate::domain::error::Result;
use crate::domain::pipeline_config::{ExplainPolicy, PipelineConfig};
use crate::domain::sql::{ExecutionError, ExecutionOutcome, QueryResult, SqlCandidate};
use crate::infrastructure::db::QueryExecutor;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { row_count: usize },
    GenerationFailed { message: String },
    ExecutionFailed { error: ExecutionError },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    /// `None` when generation produced no statement
    pub sql: Option<String>,
    pub prompt: String,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Done {
        candidate: SqlCandidate,
        result: QueryResult,
        attempts: Vec<AttemptRecord>,
    },
    Exhausted {
        last_error: String,
        attempts: Vec<AttemptRecord>,
    },
}

impl PipelineOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, PipelineOutcome::Done { .. })
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            PipelineOutcome::Done { attempts, .. } | PipelineOutcome::Exhausted { attempts, .. } => {
                attempts
            }
        }
    }

    /// Most recent statement that was actually generated.
    pub fn last_sql(&self) -> Option<&str> {
        match self {
            PipelineOutcome::Done { candidate, .. } => Some(candidate.sql.as_str()),
            PipelineOutcome::Exhausted { attempts, .. } => {
                attempts.iter().rev().find_map(|a| a.sql.as_deref())
            }
        }
    }
}

pub struct RetryController {
    generator: SqlGenerator,
    executor: Arc<dyn QueryExecutor>,
    prompts: PromptFactory,
    max_attempts: u32,
    explain_policy: ExplainPolicy,
}

impl RetryController {
    pub fn new(
        generator: SqlGenerator,
        executor: Arc<dyn QueryExecutor>,
        prompts: PromptFactory,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            generator,
            executor,
            prompts,
            max_attempts: config.max_attempts.max(1),
            explain_policy: config.explain_policy,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `Err` only for infrastructure failures; engine errors and bad model
    /// output are consumed as failed attempts.
    pub async fn run(&self, user_query: &str, schema_text: &str) -> Result<PipelineOutcome> {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut feedback = RetryFeedback::default();
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            let prompt = if attempt == 1 {
                self.prompts.sql_generation_prompt(user_query, schema_text, None)
            } else {
                self.prompts
                    .sql_generation_prompt(user_query, schema_text, Some(&feedback))
            };

            let candidate = match self.generator.generate(&prompt, attempt).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(
                        "[Retry] Attempt {}/{} produced no SQL: {}",
                        attempt, self.max_attempts, e
                    );
                    last_error = e.to_string();
                    attempts.push(AttemptRecord {
                        attempt,
                        sql: None,
                        prompt,
                        outcome: AttemptOutcome::GenerationFailed {
                            message: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            info!(
                "[Retry] Attempt {}/{} executing: {}",
                attempt, self.max_attempts, candidate.sql
            );

            match self.executor.execute(&candidate.sql).await? {
                ExecutionOutcome::Success(result) => {
                    info!(
                        "[Retry] Attempt {}/{} succeeded with {} rows",
                        attempt,
                        self.max_attempts,
                        result.row_count()
                    );
                    attempts.push(AttemptRecord {
                        attempt,
                        sql: Some(candidate.sql.clone()),
                        prompt,
                        outcome: AttemptOutcome::Succeeded {
                            row_count: result.row_count(),
                        },
                    });
                    return Ok(PipelineOutcome::Done {
                        candidate,
                        result,
                        attempts,
                    });
                }
                ExecutionOutcome::Failure(error) => {
                    warn!(
                        "[Retry] Attempt {}/{} failed: {}",
                        attempt, self.max_attempts, error
                    );

                    let explain = if attempt < self.max_attempts
                        && self.explain_policy == ExplainPolicy::OnFailure
                    {
                        self.executor.explain(&candidate.sql).await
                    } else {
                        None
                    };
                    if let Some(plan) = &explain {
                        debug!("[Retry] Plan for failed statement: {}", plan);
                    }

                    feedback = RetryFeedback {
                        previous_sql: Some(candidate.sql.clone()),
                        previous_error: Some(error.message.clone()),
                        explain,
                    };
                    last_error = error.to_string();
                    attempts.push(AttemptRecord {
                        attempt,
                        sql: Some(candidate.sql),
                        prompt,
                        outcome: AttemptOutcome::ExecutionFailed { error },
                    });
                }
            }
        }

        warn!(
            "[Retry] Giving up after {} attempts: {}",
            self.max_attempts, last_error
        );
        Ok(PipelineOutcome::Exhausted {
            last_error,
            attempts,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators shared by the pipeline tests.

    use crate::domain::error::{AppError, Result};
    use crate::domain::pipeline_config::SqlDialect;
    use crate::domain::sql::ExecutionOutcome;
    use crate::infrastructure::db::QueryExecutor;
    use crate::infrastructure::llm_clients::LLMClient;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies in order and records every prompt it was given.
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<std::result::Result<String, String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = std::result::Result<S, S>>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(Into::into).map_err(Into::into))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub fn prompt(&self, index: usize) -> String {
            self.prompts.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(AppError::LLMError(message)),
                None => Err(AppError::LLMError("script exhausted".to_string())),
            }
        }

        fn describe(&self) -> String {
            "scripted/test".to_string()
        }
    }

    /// Returns queued outcomes in order and records executed statements.
    pub struct ScriptedExecutor {
        outcomes: Mutex<VecDeque<ExecutionOutcome>>,
        plan: Option<String>,
        pub executed: Mutex<Vec<String>>,
        pub explained: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        pub fn new(outcomes: Vec<ExecutionOutcome>, plan: Option<&str>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                plan: plan.map(str::to_string),
                executed: Mutex::new(Vec::new()),
                explained: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QueryExecutor for ScriptedExecutor {
        async fn execute(&self, sql: &str) -> Result<ExecutionOutcome> {
            self.executed.lock().unwrap().push(sql.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::DatabaseError("no scripted outcome".to_string()))
        }

        async fn explain(&self, sql: &str) -> Option<String> {
            self.explained.lock().unwrap().push(sql.to_string());
            self.plan.clone()
        }

        fn dialect(&self) -> SqlDialect {
            SqlDialect::Postgres
        }
    }
}
