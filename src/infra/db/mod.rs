//! Postgres-backed repository implementations.

mod dictionary;
mod usage;
mod util;

pub use util::map_sqlx_error;

use std::{sync::Arc, time::Duration};

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};
use tracing::info;

use crate::{config::DatabaseSettings, infra::error::InfraError};

/// A webhook must not wait on a saturated pool longer than this.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connect with the configured pool size and bring the schema up to date.
    pub async fn open(url: &str, settings: &DatabaseSettings) -> Result<Self, InfraError> {
        let pool = Self::connect(url, settings.max_connections.get()).await?;
        Self::run_migrations(&pool).await?;
        info!(
            target = "tallybot::db",
            max_connections = settings.max_connections.get(),
            "Database ready"
        );
        Ok(Self::new(pool))
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
