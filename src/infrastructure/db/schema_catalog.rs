//! Schema inspection for the target database.
//!
//! Each `inspect()` call returns a fresh snapshot; nothing is cached between calls.

use super::connection::DatabasePool;
use crate::domain::error::{AppError, Result};
use crate::domain::pipeline_config::DatabaseConfig;
use crate::domain::schema::{ColumnMeta, IndexMeta, SchemaItem};
use async_trait::async_trait;
use sqlx::{PgPool, Row, SqlitePool};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    async fn inspect(&self) -> Result<Vec<SchemaItem>>;
}

/// Picks the catalog matching the pool's backend.
pub fn catalog_for(pool: &DatabasePool, config: &DatabaseConfig) -> Arc<dyn SchemaCatalog> {
    let timeout = Duration::from_secs(config.query_timeout_secs);
    match pool {
        DatabasePool::Postgres(pg) => Arc::new(PgSchemaCatalog::new(
            pg.clone(),
            config.schemas.clone(),
            timeout,
        )),
        DatabasePool::Sqlite(sqlite) => Arc::new(SqliteSchemaCatalog::new(sqlite.clone(), timeout)),
    }
}

async fn with_timeout<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| {
            AppError::DatabaseError(format!(
                "{} timed out after {} seconds",
                what,
                timeout.as_secs()
            ))
        })?
        .map_err(|e| AppError::DatabaseError(format!("{} failed: {}", what, e)))
}

// ============================================================
// PostgreSQL
// ============================================================

const PG_TABLES_QUERY: &str = r#"
    SELECT
        t.table_schema::text AS table_schema,
        t.table_name::text AS table_name,
        obj_description(c.oid, 'pg_class') AS description,
        c.reltuples::bigint AS row_count
    FROM information_schema.tables t
    JOIN pg_namespace n ON n.nspname = t.table_schema
    JOIN pg_class c ON c.relname = t.table_name AND c.relnamespace = n.oid
    WHERE t.table_schema = ANY($1)
        AND t.table_type = 'BASE TABLE'
    ORDER BY t.table_schema, t.table_name
"#;

const PG_COLUMNS_QUERY: &str = r#"
    SELECT
        column_name::text AS column_name,
        CASE
            WHEN data_type IN ('USER-DEFINED', 'ARRAY') THEN udt_name::text
            ELSE data_type::text
        END AS data_type,
        is_nullable = 'YES' AS is_nullable
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position
"#;

const PG_KEYS_QUERY: &str = r#"
    SELECT
        con.contype::text AS kind,
        a.attname::text AS column_name,
        CASE WHEN con.contype = 'f'
            THEN format('%s.%s(%s)', fn.nspname, fc.relname, fa.attname)
        END AS target
    FROM pg_constraint con
    JOIN pg_class c ON c.oid = con.conrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(attnum, fattnum)
    JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
    LEFT JOIN pg_class fc ON fc.oid = con.confrelid
    LEFT JOIN pg_namespace fn ON fn.oid = fc.relnamespace
    LEFT JOIN pg_attribute fa ON fa.attrelid = con.confrelid AND fa.attnum = k.fattnum
    WHERE n.nspname = $1
        AND c.relname = $2
        AND con.contype IN ('p', 'f')
"#;

const PG_INDEXES_QUERY: &str = r#"
    SELECT
        i.relname::text AS index_name,
        ix.indisprimary AS is_primary,
        array_agg(a.attname::text ORDER BY k.ord) AS columns
    FROM pg_index ix
    JOIN pg_class t ON t.oid = ix.indrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_class i ON i.oid = ix.indexrelid
    CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    WHERE n.nspname = $1 AND t.relname = $2
    GROUP BY i.relname, ix.indisprimary
    ORDER BY i.relname
"#;

/// Reads information_schema and pg_catalog for the configured schemas.
pub struct PgSchemaCatalog {
    pool: PgPool,
    schemas: Vec<String>,
    query_timeout: Duration,
}

impl PgSchemaCatalog {
    pub fn new(pool: PgPool, schemas: Vec<String>, query_timeout: Duration) -> Self {
        let schemas = if schemas.is_empty() {
            vec!["public".to_string()]
        } else {
            schemas
        };
        Self {
            pool,
            schemas,
            query_timeout,
        }
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnMeta>> {
        let rows = with_timeout(
            self.query_timeout,
            "Column listing",
            sqlx::query(PG_COLUMNS_QUERY)
                .bind(schema)
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("column_name").map_err(|e| {
                AppError::DatabaseError(format!("Failed to parse column_name: {}", e))
            })?;
            let data_type: String = row.try_get("data_type").map_err(|e| {
                AppError::DatabaseError(format!("Failed to parse data_type: {}", e))
            })?;
            let nullable: bool = row.try_get("is_nullable").unwrap_or(true);

            let mut column = ColumnMeta::new(&name, &data_type);
            column.nullable = nullable;
            columns.push(column);
        }

        let keys = with_timeout(
            self.query_timeout,
            "Key listing",
            sqlx::query(PG_KEYS_QUERY)
                .bind(schema)
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await?;

        for row in keys {
            let kind: String = row.try_get("kind").unwrap_or_default();
            let column_name: String = row.try_get("column_name").unwrap_or_default();
            let target: Option<String> = row.try_get("target").ok().flatten();

            let Some(column) = columns.iter_mut().find(|c| c.name == column_name) else {
                continue;
            };
            match (kind.as_str(), target) {
                ("p", _) => {
                    column.is_primary_key = true;
                    column.nullable = false;
                }
                ("f", Some(target)) => *column = column.clone().references(&target),
                _ => {}
            }
        }

        Ok(columns)
    }

    async fn indexes(&self, schema: &str, table: &str) -> Result<Vec<IndexMeta>> {
        let rows = with_timeout(
            self.query_timeout,
            "Index listing",
            sqlx::query(PG_INDEXES_QUERY)
                .bind(schema)
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("index_name").map_err(|e| {
                AppError::DatabaseError(format!("Failed to parse index_name: {}", e))
            })?;
            indexes.push(IndexMeta {
                name,
                columns: row.try_get("columns").unwrap_or_default(),
                is_primary: row.try_get("is_primary").unwrap_or(false),
            });
        }
        Ok(indexes)
    }
}

#[async_trait]
impl SchemaCatalog for PgSchemaCatalog {
    async fn inspect(&self) -> Result<Vec<SchemaItem>> {
        let rows = with_timeout(
            self.query_timeout,
            "Table listing",
            sqlx::query(PG_TABLES_QUERY)
                .bind(self.schemas.clone())
                .fetch_all(&self.pool),
        )
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let schema: String = row.try_get("table_schema").map_err(|e| {
                AppError::DatabaseError(format!("Failed to parse table_schema: {}", e))
            })?;
            let name: String = row.try_get("table_name").map_err(|e| {
                AppError::DatabaseError(format!("Failed to parse table_name: {}", e))
            })?;

            let mut item = SchemaItem::new(&schema, &name, self.columns(&schema, &name).await?);
            item.description = row.try_get("description").ok().flatten();
            // reltuples is -1 for tables never analyzed
            item.row_count = row
                .try_get::<Option<i64>, _>("row_count")
                .ok()
                .flatten()
                .filter(|n| *n >= 0);
            item.indexes = self.indexes(&schema, &name).await?;

            debug!("[SchemaCatalog] Inspected {}", item.qualified_name());
            items.push(item);
        }

        info!(
            "[SchemaCatalog] Inspected {} tables in schemas {:?}",
            items.len(),
            self.schemas
        );
        Ok(items)
    }
}

// ============================================================
// SQLite
// ============================================================

const SQLITE_SCHEMA: &str = "main";

/// Reads `sqlite_master` and the table pragmas; row counts are exact.
pub struct SqliteSchemaCatalog {
    pool: SqlitePool,
    query_timeout: Duration,
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl SqliteSchemaCatalog {
    pub fn new(pool: SqlitePool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        let rows = with_timeout(
            self.query_timeout,
            "Column listing",
            sqlx::query(r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#)
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name").map_err(|e| {
                AppError::DatabaseError(format!("Failed to parse column name: {}", e))
            })?;
            let data_type: String = row.try_get("type").unwrap_or_default();
            let not_null: i64 = row.try_get("notnull").unwrap_or(0);
            let pk: i64 = row.try_get("pk").unwrap_or(0);

            let mut column = ColumnMeta::new(&name, &data_type);
            if not_null != 0 {
                column = column.not_null();
            }
            if pk != 0 {
                column = column.primary_key();
            }
            columns.push(column);
        }

        let keys = with_timeout(
            self.query_timeout,
            "Foreign key listing",
            sqlx::query(r#"SELECT "from", "table", "to" FROM pragma_foreign_key_list(?1)"#)
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await?;

        for row in keys {
            let from: String = row.try_get("from").unwrap_or_default();
            let target_table: String = row.try_get("table").unwrap_or_default();
            let target_column: Option<String> = row.try_get("to").ok().flatten();

            let target = match target_column {
                Some(col) => format!("{}.{}({})", SQLITE_SCHEMA, target_table, col),
                None => format!("{}.{}", SQLITE_SCHEMA, target_table),
            };
            if let Some(column) = columns.iter_mut().find(|c| c.name == from) {
                *column = column.clone().references(&target);
            }
        }

        Ok(columns)
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>> {
        let rows = with_timeout(
            self.query_timeout,
            "Index listing",
            sqlx::query("SELECT name, origin FROM pragma_index_list(?1) ORDER BY name")
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name").map_err(|e| {
                AppError::DatabaseError(format!("Failed to parse index name: {}", e))
            })?;
            let origin: String = row.try_get("origin").unwrap_or_default();

            let column_rows = with_timeout(
                self.query_timeout,
                "Index column listing",
                sqlx::query("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")
                    .bind(&name)
                    .fetch_all(&self.pool),
            )
            .await?;
            let columns = column_rows
                .iter()
                .filter_map(|r| r.try_get::<Option<String>, _>("name").ok().flatten())
                .collect();

            indexes.push(IndexMeta {
                name,
                columns,
                is_primary: origin == "pk",
            });
        }
        Ok(indexes)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        with_timeout(
            self.query_timeout,
            "Row count",
            sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl SchemaCatalog for SqliteSchemaCatalog {
    async fn inspect(&self) -> Result<Vec<SchemaItem>> {
        let tables: Vec<String> = with_timeout(
            self.query_timeout,
            "Table listing",
            sqlx::query_scalar(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .fetch_all(&self.pool),
        )
        .await?;

        let mut items = Vec::with_capacity(tables.len());
        for name in tables {
            let mut item = SchemaItem::new(SQLITE_SCHEMA, &name, self.columns(&name).await?);
            item.row_count = Some(self.row_count(&name).await?);
            item.indexes = self.indexes(&name).await?;
            items.push(item);
        }

        info!("[SchemaCatalog] Inspected {} SQLite tables", items.len());
        Ok(items)
    }
}

// ============================================================
// Static
// ============================================================

/// Fixed snapshot, for callers that already hold schema metadata.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaCatalog {
    items: Vec<SchemaItem>,
}

impl StaticSchemaCatalog {
    pub fn new(items: Vec<SchemaItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl SchemaCatalog for StaticSchemaCatalog {
    async fn inspect(&self) -> Result<Vec<SchemaItem>> {
        Ok(self.items.clone())
    }
}
