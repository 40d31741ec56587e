//! Offline accuracy harness over a gold set.
//!
//! Each case is scored on its own: textual match after normalization first,
//! then execution of both statements and a multiset comparison of the rows.

use super::nl2sql_pipeline::Nl2SqlPipeline;
use super::result_comparator::{normalize_sql, results_equal};
use crate::domain::error::{AppError, Result};
use crate::domain::evaluation::{EvalCaseResult, EvalReport, GoldCase, GoldSet, Verdict};
use crate::domain::sql::{ExecutionOutcome, QueryResult};
use crate::infrastructure::db::QueryExecutor;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Source of predicted SQL for a natural-language query.
#[async_trait]
pub trait SqlPredictor: Send + Sync {
    async fn predict(&self, nl_query: &str) -> Result<String>;
}

/// Answers with the gold statement itself, whitespace-collapsed, and
/// `SELECT 1;` for queries it does not know. Useful as a harness smoke test.
pub struct GoldEchoPredictor {
    gold: GoldSet,
}

impl GoldEchoPredictor {
    pub fn new(gold: GoldSet) -> Self {
        Self { gold }
    }
}

#[async_trait]
impl SqlPredictor for GoldEchoPredictor {
    async fn predict(&self, nl_query: &str) -> Result<String> {
        Ok(match self.gold.get(nl_query) {
            Some(sql) => sql.split_whitespace().collect::<Vec<_>>().join(" "),
            None => "SELECT 1;".to_string(),
        })
    }
}

#[async_trait]
impl SqlPredictor for Nl2SqlPipeline {
    /// Winning statement, or the last one tried when every attempt failed.
    async fn predict(&self, nl_query: &str) -> Result<String> {
        let outcome = self.run(nl_query).await?;
        outcome.last_sql().map(str::to_string).ok_or_else(|| {
            AppError::LLMError("Pipeline produced no SQL statement".to_string())
        })
    }
}

enum Executed {
    Rows(QueryResult),
    Failed(String),
}

pub struct Evaluator {
    executor: Arc<dyn QueryExecutor>,
    predictor: Arc<dyn SqlPredictor>,
}

impl Evaluator {
    pub fn new(executor: Arc<dyn QueryExecutor>, predictor: Arc<dyn SqlPredictor>) -> Self {
        Self {
            executor,
            predictor,
        }
    }

    pub async fn evaluate(&self, gold: &GoldSet) -> EvalReport {
        let started_at = chrono::Utc::now();
        let mut cases = Vec::with_capacity(gold.len());
        for case in gold.iter() {
            cases.push(self.evaluate_case(case).await);
        }
        self.finish(started_at, cases)
    }

    /// Runs up to `concurrency` cases at once. Results keep gold order.
    pub async fn evaluate_concurrent(&self, gold: &GoldSet, concurrency: usize) -> EvalReport {
        let started_at = chrono::Utc::now();
        let cases: Vec<EvalCaseResult> = futures::stream::iter(gold.iter())
            .map(|case| self.evaluate_case(case))
            .buffered(concurrency.max(1))
            .collect()
            .await;
        self.finish(started_at, cases)
    }

    pub async fn evaluate_case(&self, case: &GoldCase) -> EvalCaseResult {
        let started = Instant::now();

        let (pred_sql, verdict, details) = match self.predictor.predict(&case.nl_query).await {
            Ok(pred_sql) => {
                let (verdict, details) = self.score(&case.sql, &pred_sql).await;
                (pred_sql, verdict, details)
            }
            Err(e) => (String::new(), Verdict::Error, e.to_string()),
        };

        let time_ms = started.elapsed().as_secs_f64() * 1000.0;
        match verdict {
            Verdict::Fail | Verdict::Error => warn!(
                "[Eval] {} '{}' ({:.1} ms): {}",
                verdict.as_str(),
                case.nl_query,
                time_ms,
                details
            ),
            _ => info!(
                "[Eval] {} '{}' ({:.1} ms)",
                verdict.as_str(),
                case.nl_query,
                time_ms
            ),
        }

        EvalCaseResult {
            nl_query: case.nl_query.clone(),
            gt_sql: case.sql.clone(),
            pred_sql,
            verdict,
            details,
            time_ms,
        }
    }

    async fn score(&self, gt_sql: &str, pred_sql: &str) -> (Verdict, String) {
        if normalize_sql(gt_sql) == normalize_sql(pred_sql) {
            return (
                Verdict::ExactMatch,
                "Pred SQL matches GT SQL after normalization.".to_string(),
            );
        }

        let gt = match self.run(gt_sql).await {
            Executed::Rows(rows) => rows,
            Executed::Failed(message) => return (Verdict::Error, message),
        };
        let pred = match self.run(pred_sql).await {
            Executed::Rows(rows) => rows,
            Executed::Failed(message) => return (Verdict::Error, message),
        };

        if results_equal(&gt, &pred) {
            (
                Verdict::SemanticMatch,
                "SQL differs, but query results match (same columns + same rows ignoring order)."
                    .to_string(),
            )
        } else if gt.columns != pred.columns {
            (
                Verdict::Fail,
                format!(
                    "Columns differ. GT columns={:?} vs PRED columns={:?}.",
                    gt.columns, pred.columns
                ),
            )
        } else {
            (
                Verdict::Fail,
                format!(
                    "Results differ. GT rows={} vs PRED rows={}.",
                    gt.row_count(),
                    pred.row_count()
                ),
            )
        }
    }

    async fn run(&self, sql: &str) -> Executed {
        match self.executor.execute(sql).await {
            Ok(ExecutionOutcome::Success(result)) => Executed::Rows(result),
            Ok(ExecutionOutcome::Failure(error)) => Executed::Failed(error.to_string()),
            Err(e) => Executed::Failed(e.to_string()),
        }
    }

    fn finish(
        &self,
        started_at: chrono::DateTime<chrono::Utc>,
        cases: Vec<EvalCaseResult>,
    ) -> EvalReport {
        let report = EvalReport::new(started_at, cases);
        let s = &report.summary;
        info!(
            "[Eval] total={} exact={} semantic={} fail={} error={} accuracy={:.3}",
            s.total, s.exact_match, s.semantic_match, s.fail, s.error, s.accuracy
        );
        report
    }
}
