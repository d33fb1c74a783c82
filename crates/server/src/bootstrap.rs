use std::sync::Arc;

use claimdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use claimdesk_core::lifecycle::ClaimLifecycle;
use claimdesk_core::NoopAuditSink;
use claimdesk_db::{
    connect, migrations, DbPool, FsReceiptStore, SqlCategoryRepository, SqlClaimRepository,
    SqlUserRepository,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub lifecycle: Arc<ClaimLifecycle>,
    pub users: Arc<SqlUserRepository>,
    pub categories: Arc<SqlCategoryRepository>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let users = Arc::new(SqlUserRepository::new(db_pool.clone()));
    let categories = Arc::new(SqlCategoryRepository::new(db_pool.clone()));
    let lifecycle = Arc::new(ClaimLifecycle::new(
        Arc::new(SqlClaimRepository::new(db_pool.clone())),
        categories.clone(),
        users.clone(),
        Arc::new(FsReceiptStore::new(
            config.receipts.storage_dir.clone(),
            config.receipts.max_size_bytes,
        )),
        Arc::new(NoopAuditSink),
    ));

    Ok(Application { config, db_pool, lifecycle, users, categories })
}

#[cfg(test)]
mod tests {
    use claimdesk_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn memory_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_exposes_the_data_path() {
        let app = bootstrap(memory_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table'
               AND name IN ('app_user', 'expense_category', 'claim', 'claim_status_history')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables to be available after bootstrap");
        assert_eq!(table_count, 4, "bootstrap should expose the claim-path tables");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_database_urls() {
        let result = bootstrap(memory_options("postgres://nope")).await;
        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"));
    }
}
