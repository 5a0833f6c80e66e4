//! Command implementations

pub mod ingest;
pub mod status;

use sqlx::PgPool;

use skuflow_server::{config::DatabaseConfig, db};

use crate::error::{CliError, Result};

/// Connect using `DATABASE_*` settings, with `database_url` taking precedence,
/// and bring the schema up to date
pub async fn connect(database_url: Option<&str>) -> Result<PgPool> {
    let mut config = DatabaseConfig::from_env();
    if let Some(url) = database_url {
        config.url = url.to_string();
    }
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;
    Ok(pool)
}
