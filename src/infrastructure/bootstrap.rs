use std::sync::Arc;

use tracing::{error, info};

use crate::application::Nl2SqlPipeline;
use crate::domain::error::Result;
use crate::domain::pipeline_config::AppConfig;
use crate::infrastructure::config::ConfigService;
use crate::infrastructure::db::connection::redact_url;
use crate::infrastructure::db::{
    catalog_for, DatabasePool, QueryExecutor, SchemaCatalog, SqlxQueryExecutor,
};
use crate::infrastructure::llm_clients::{build_llm_client, LLMClient};

/// Long-lived resources shared by every command.
pub struct Services {
    pub config: AppConfig,
    pub pool: DatabasePool,
    pub executor: Arc<dyn QueryExecutor>,
    pub catalog: Arc<dyn SchemaCatalog>,
}

impl Services {
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let pool = DatabasePool::connect(&config.database).await.map_err(|err| {
            error!(
                error = %err,
                url = %redact_url(&config.database.url),
                "Failed to open database"
            );
            err
        })?;

        let executor: Arc<dyn QueryExecutor> =
            Arc::new(SqlxQueryExecutor::new(pool.clone(), &config.database));
        let catalog = catalog_for(&pool, &config.database);

        info!(
            "Connected to {} (read_only={})",
            pool.dialect().display_name(),
            config.database.read_only
        );

        Ok(Self {
            config,
            pool,
            executor,
            catalog,
        })
    }

    /// Resolves the API key reference and builds the configured client.
    pub fn llm_client(&self, config_service: &ConfigService) -> Result<Arc<dyn LLMClient>> {
        let llm_config = config_service.resolve_llm_config(&self.config.llm)?;
        build_llm_client(&llm_config)
    }

    pub fn pipeline(&self, llm: Arc<dyn LLMClient>) -> Nl2SqlPipeline {
        Nl2SqlPipeline::new(
            llm,
            self.executor.clone(),
            self.catalog.clone(),
            &self.config.pipeline,
        )
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline_config::DatabaseConfig;

    #[tokio::test]
    async fn test_connect_sqlite_memory() {
        let config = AppConfig {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                ..DatabaseConfig::default()
            },
            ..AppConfig::default()
        };
        let services = Services::connect(config).await.unwrap();
        assert!(services.catalog.inspect().await.unwrap().is_empty());
        services.shutdown().await;
    }

    #[tokio::test]
    async fn test_local_provider_needs_no_key() {
        let config = AppConfig {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                ..DatabaseConfig::default()
            },
            ..AppConfig::default()
        };
        let services = Services::connect(config).await.unwrap();
        let llm = services.llm_client(&ConfigService::new()).unwrap();
        assert_eq!(llm.describe(), "local/local-model");
    }
}
