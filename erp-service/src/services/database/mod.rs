//! Database service for erp-service.
//!
//! `Database` wraps the SQLite pool. Persistence for each entity lives in its
//! own submodule as further `impl Database` blocks.

mod attachment;
mod business_partner;
mod country;
mod customization;
mod dashboard;
mod issue;
mod payment;
mod payroll;
mod security;
mod workflow;

use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

impl Database {
    /// Create a new database connection pool.
    ///
    /// An in-memory database lives only as long as its connection, so such
    /// pools are pinned to one connection that is never recycled.
    #[instrument(skip(database_url), fields(service = "erp-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to SQLite"
        );

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .min_connections(min_connections)
                .idle_timeout(Duration::from_secs(600))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("SQLite connection pool established");

        Ok(Self { pool })
    }

    /// Fresh in-memory database with migrations applied.
    pub async fn in_memory() -> Result<Self, AppError> {
        let db = Self::new("sqlite::memory:", 1, 1).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Sqlite>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    /// Reserve the next number of a document sequence, e.g. `PAY-000042`.
    pub(crate) async fn next_document_no(
        tx: &mut Transaction<'static, Sqlite>,
        sequence: &str,
    ) -> Result<String, AppError> {
        let (prefix, value): (String, i64) = sqlx::query_as(
            "UPDATE document_sequences SET next_value = next_value + 1 \
             WHERE name = ? RETURNING prefix, next_value - 1",
        )
        .bind(sequence)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error("reserve document number"))?
        .ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("Document sequence {} is missing", sequence))
        })?;

        Ok(format!("{}{:06}", prefix, value))
    }
}

pub(crate) async fn commit(tx: Transaction<'static, Sqlite>) -> Result<(), AppError> {
    tx.commit().await.map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
    })
}

/// `map_err` adapter producing a `DatabaseError` with context.
pub(crate) fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", action, e))
}

/// Like [`db_error`], but unique-key violations become `Conflict`.
pub(crate) fn db_error_or_conflict(
    action: &'static str,
    conflict: String,
) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        let unique = e
            .as_database_error()
            .map(|d| d.is_unique_violation())
            .unwrap_or(false);
        if unique {
            AppError::Conflict(anyhow::anyhow!(conflict))
        } else {
            AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", action, e))
        }
    }
}
