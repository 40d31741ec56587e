pub mod connection;
pub mod executor;
pub mod read_only_guard;
pub mod schema_catalog;

pub use connection::DatabasePool;
pub use executor::{QueryExecutor, SqlxQueryExecutor};
pub use schema_catalog::{
    catalog_for, PgSchemaCatalog, SchemaCatalog, SqliteSchemaCatalog, StaticSchemaCatalog,
};
