//! Executes generated SQL and converts engine results into typed rows.
//!
//! Engine errors are returned as `ExecutionOutcome::Failure` with the engine's
//! message untouched, because that text is what the retry loop shows the model.
//! Only infrastructure failures (pool exhausted, connection lost) become `Err`.

use super::connection::DatabasePool;
use super::read_only_guard::check_read_only;
use crate::domain::error::{AppError, Result};
use crate::domain::pipeline_config::{DatabaseConfig, SqlDialect};
use crate::domain::sql::{
    ExecutionError, ExecutionErrorKind, ExecutionOutcome, QueryResult, SqlValue,
};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Connection, Database, Executor, Row, TypeInfo, ValueRef};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Virtual machine steps between SQLite deadline checks.
const SQLITE_PROGRESS_STEPS: i32 = 1_000;

const SQLITE_INTERRUPT_GRACE: Duration = Duration::from_secs(1);

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ExecutionOutcome>;

    /// Plan text for a statement, or `None` when the plan cannot be produced.
    async fn explain(&self, sql: &str) -> Option<String>;

    fn dialect(&self) -> SqlDialect;
}

pub struct SqlxQueryExecutor {
    pool: DatabasePool,
    query_timeout: Duration,
    read_only: bool,
}

impl SqlxQueryExecutor {
    pub fn new(pool: DatabasePool, config: &DatabaseConfig) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            read_only: config.read_only,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    async fn run_postgres(&self, pool: &sqlx::PgPool, sql: &str) -> Result<ExecutionOutcome> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {}", e)))?;

        let fetched = tokio::time::timeout(self.query_timeout, sqlx::query(sql).fetch_all(&mut *conn)).await;
        let rows = match fetched {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => return classify_sqlx_error(e, SqlDialect::Postgres),
            Err(_) => return Ok(self.timed_out(conn).await),
        };

        let columns = match rows.first() {
            Some(row) => column_names(row.columns()),
            None => match (&mut *conn).describe(sql).await {
                Ok(description) => column_names(description.columns()),
                Err(e) => return classify_sqlx_error(e, SqlDialect::Postgres),
            },
        };

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_pg_row(row) {
                Ok(values) => decoded.push(values),
                Err(err) => return Ok(ExecutionOutcome::Failure(err)),
            }
        }

        Ok(ExecutionOutcome::Success(QueryResult {
            columns,
            rows: decoded,
        }))
    }

    /// `tokio::time::timeout` alone cannot stop `sqlite3_step` on the worker
    /// thread, so a progress handler interrupts the statement at the deadline.
    /// The outer timeout only fires if the interrupt is never observed.
    async fn run_sqlite(&self, pool: &sqlx::SqlitePool, sql: &str) -> Result<ExecutionOutcome> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {}", e)))?;

        let deadline = Instant::now() + self.query_timeout;
        conn.lock_handle()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to lock SQLite handle: {}", e)))?
            .set_progress_handler(SQLITE_PROGRESS_STEPS, move || Instant::now() < deadline);

        let fetched = tokio::time::timeout(
            self.query_timeout + SQLITE_INTERRUPT_GRACE,
            sqlx::query(sql).fetch_all(&mut *conn),
        )
        .await;

        let rows = match fetched {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                clear_progress_handler(&mut conn).await;
                if Instant::now() >= deadline && is_sqlite_interrupt(&e) {
                    warn!(
                        "Statement interrupted after {}s timeout",
                        self.query_timeout.as_secs_f64()
                    );
                    return Ok(self.timeout_failure());
                }
                return classify_sqlx_error(e, SqlDialect::Sqlite);
            }
            Err(_) => return Ok(self.timed_out(conn).await),
        };
        clear_progress_handler(&mut conn).await;

        let columns = match rows.first() {
            Some(row) => column_names(row.columns()),
            None => match (&mut *conn).describe(sql).await {
                Ok(description) => column_names(description.columns()),
                Err(e) => return classify_sqlx_error(e, SqlDialect::Sqlite),
            },
        };

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_sqlite_row(row) {
                Ok(values) => decoded.push(values),
                Err(err) => return Ok(ExecutionOutcome::Failure(err)),
            }
        }

        Ok(ExecutionOutcome::Success(QueryResult {
            columns,
            rows: decoded,
        }))
    }

    /// The abandoned connection may still be mid-statement, so it is closed
    /// instead of going back to the pool.
    async fn timed_out<DB: Database>(&self, conn: PoolConnection<DB>) -> ExecutionOutcome {
        warn!(
            "Statement exceeded {}s timeout, closing its connection",
            self.query_timeout.as_secs_f64()
        );
        let _ = conn.detach().close().await;
        self.timeout_failure()
    }

    fn timeout_failure(&self) -> ExecutionOutcome {
        ExecutionOutcome::failure(
            ExecutionErrorKind::Timeout,
            format!(
                "Query timed out after {} seconds",
                self.query_timeout.as_secs_f64()
            ),
        )
    }
}

#[async_trait]
impl QueryExecutor for SqlxQueryExecutor {
    async fn execute(&self, sql: &str) -> Result<ExecutionOutcome> {
        if self.read_only {
            if let Err(violation) = check_read_only(sql) {
                debug!("Rejected statement before execution: {}", violation);
                return Ok(ExecutionOutcome::Failure(violation));
            }
        }

        match &self.pool {
            DatabasePool::Postgres(pool) => self.run_postgres(pool, sql).await,
            DatabasePool::Sqlite(pool) => self.run_sqlite(pool, sql).await,
        }
    }

    async fn explain(&self, sql: &str) -> Option<String> {
        if check_read_only(sql).is_err() {
            return None;
        }
        let statement = sql.trim().trim_end_matches(';');

        let plan = match &self.pool {
            DatabasePool::Postgres(_) => {
                let outcome = self
                    .execute(&format!("EXPLAIN (FORMAT JSON) {}", statement))
                    .await
                    .ok()?;
                match outcome {
                    ExecutionOutcome::Success(result) => result
                        .rows
                        .first()
                        .and_then(|row| row.first())
                        .map(|value| value.to_string()),
                    ExecutionOutcome::Failure(_) => None,
                }
            }
            DatabasePool::Sqlite(_) => {
                let outcome = self
                    .execute(&format!("EXPLAIN QUERY PLAN {}", statement))
                    .await
                    .ok()?;
                match outcome {
                    ExecutionOutcome::Success(result) => Some(render_plan_rows(&result)),
                    ExecutionOutcome::Failure(_) => None,
                }
            }
        };

        plan.filter(|p| !p.trim().is_empty())
    }

    fn dialect(&self) -> SqlDialect {
        self.pool.dialect()
    }
}

async fn clear_progress_handler(conn: &mut PoolConnection<sqlx::Sqlite>) {
    match conn.lock_handle().await {
        Ok(mut handle) => handle.remove_progress_handler(),
        Err(e) => debug!("Could not clear SQLite progress handler: {}", e),
    }
}

fn is_sqlite_interrupt(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().to_lowercase().contains("interrupted"),
        _ => false,
    }
}

fn render_plan_rows(result: &QueryResult) -> String {
    // EXPLAIN QUERY PLAN columns: id, parent, notused, detail
    result
        .rows
        .iter()
        .map(|row| {
            row.last()
                .map(|detail| detail.to_string())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

/// Maps a sqlx error to an execution failure, or to `Err` for infrastructure faults.
fn classify_sqlx_error(err: sqlx::Error, dialect: SqlDialect) -> Result<ExecutionOutcome> {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string());
            let message = db_err.message().to_string();
            let kind = match dialect {
                SqlDialect::Postgres => classify_sqlstate(code.as_deref()),
                SqlDialect::Sqlite => classify_sqlite_message(&message),
            };
            let error = ExecutionError::new(kind, message);
            Ok(ExecutionOutcome::Failure(match code {
                Some(code) => error.with_code(code),
                None => error,
            }))
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. } => Ok(ExecutionOutcome::failure(
            ExecutionErrorKind::Decode,
            err.to_string(),
        )),
        other => Err(AppError::DatabaseError(format!(
            "Query execution failed: {}",
            other
        ))),
    }
}

fn classify_sqlstate(code: Option<&str>) -> ExecutionErrorKind {
    match code {
        Some("42601") => ExecutionErrorKind::Syntax,
        Some("42P01") | Some("42703") | Some("42883") | Some("3F000") => {
            ExecutionErrorKind::UndefinedObject
        }
        Some("42804") | Some("22P02") | Some("42846") => ExecutionErrorKind::TypeMismatch,
        Some("57014") => ExecutionErrorKind::Timeout,
        Some("25006") | Some("42501") => ExecutionErrorKind::ReadOnlyViolation,
        _ => ExecutionErrorKind::Database,
    }
}

fn classify_sqlite_message(message: &str) -> ExecutionErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("syntax error") || lower.contains("incomplete input") {
        ExecutionErrorKind::Syntax
    } else if lower.contains("no such table")
        || lower.contains("no such column")
        || lower.contains("no such function")
    {
        ExecutionErrorKind::UndefinedObject
    } else if lower.contains("datatype mismatch") {
        ExecutionErrorKind::TypeMismatch
    } else if lower.contains("readonly") || lower.contains("read-only") {
        ExecutionErrorKind::ReadOnlyViolation
    } else if lower.contains("interrupted") {
        ExecutionErrorKind::Timeout
    } else {
        ExecutionErrorKind::Database
    }
}

fn decode_error(column: &str, err: impl std::fmt::Display) -> ExecutionError {
    ExecutionError::new(
        ExecutionErrorKind::Decode,
        format!("Failed to decode column '{}': {}", column, err),
    )
}

fn decode_pg_row(row: &PgRow) -> std::result::Result<Vec<SqlValue>, ExecutionError> {
    let mut values = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        values.push(decode_pg_value(row, index, column.name(), column.type_info().name())?);
    }
    Ok(values)
}

fn decode_pg_value(
    row: &PgRow,
    index: usize,
    column: &str,
    type_name: &str,
) -> std::result::Result<SqlValue, ExecutionError> {
    let raw = row.try_get_raw(index).map_err(|e| decode_error(column, e))?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }

    let err = |e: sqlx::Error| decode_error(column, e);
    let value = match type_name.to_uppercase().as_str() {
        "BOOL" => SqlValue::Bool(row.try_get::<bool, _>(index).map_err(err)?),
        "INT2" => SqlValue::Int(row.try_get::<i16, _>(index).map_err(err)? as i64),
        "INT4" => SqlValue::Int(row.try_get::<i32, _>(index).map_err(err)? as i64),
        "INT8" => SqlValue::Int(row.try_get::<i64, _>(index).map_err(err)?),
        "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(index).map_err(err)? as f64),
        "FLOAT8" => SqlValue::Float(row.try_get::<f64, _>(index).map_err(err)?),
        "NUMERIC" => SqlValue::Decimal(row.try_get::<BigDecimal, _>(index).map_err(err)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
            SqlValue::Text(row.try_get::<String, _>(index).map_err(err)?)
        }
        "BYTEA" => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(index).map_err(err)?),
        "DATE" => SqlValue::Date(row.try_get::<chrono::NaiveDate, _>(index).map_err(err)?),
        "TIME" => SqlValue::Time(row.try_get::<chrono::NaiveTime, _>(index).map_err(err)?),
        "TIMESTAMP" => {
            SqlValue::Timestamp(row.try_get::<chrono::NaiveDateTime, _>(index).map_err(err)?)
        }
        "TIMESTAMPTZ" => SqlValue::TimestampTz(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)
                .map_err(err)?,
        ),
        "UUID" => SqlValue::Uuid(row.try_get::<uuid::Uuid, _>(index).map_err(err)?),
        "JSON" | "JSONB" => {
            SqlValue::json(&row.try_get::<serde_json::Value, _>(index).map_err(err)?)
        }
        other => {
            return Err(ExecutionError::new(
                ExecutionErrorKind::Decode,
                format!("Unsupported column type {} for column '{}'", other, column),
            ))
        }
    };

    Ok(value)
}

fn decode_sqlite_row(row: &SqliteRow) -> std::result::Result<Vec<SqlValue>, ExecutionError> {
    let mut values = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        values.push(decode_sqlite_value(row, index, column.name())?);
    }
    Ok(values)
}

/// SQLite is dynamically typed, so storage classes are tried in order.
fn decode_sqlite_value(
    row: &SqliteRow,
    index: usize,
    column: &str,
) -> std::result::Result<SqlValue, ExecutionError> {
    let raw = row.try_get_raw(index).map_err(|e| decode_error(column, e))?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(SqlValue::Int(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(SqlValue::Float(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(SqlValue::Text(v));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Ok(SqlValue::Bytes(v));
    }

    // declared types such as DATE store text the typed decoders refuse
    row.try_get_unchecked::<String, _>(index)
        .map(SqlValue::Text)
        .map_err(|e| decode_error(column, e))
}
