//! Event store access for the `trunkr` live trunking monitor

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod mock;
pub mod models;
pub mod pg;
pub mod queries;
pub mod store;

pub use mock::MemoryEventStore;
pub use models::{ChangeDocument, ChangeEvent, OperationType};
pub use pg::PgEventStore;
pub use store::{ChangeSubscription, EventStore};

use sqlx::postgres::PgPoolOptions;
use trunkr_core::{DatabaseConfig, Error, Result};

// Re-export PgPool for convenience
pub use sqlx::PgPool;

/// Database connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the database
    /// connection cannot be established.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        config.check()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(config.idle_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check
    ///
    /// # Errors
    ///
    /// Returns an error if the health check fails.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Health check failed: {e}")))?;

        Ok(())
    }
}
