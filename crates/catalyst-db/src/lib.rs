//! # catalyst-db
//!
//! PostgreSQL storage layer for the catalyst alerting engine.
//!
//! This crate provides:
//! - Connection pool management
//! - Saved search repository (the engine's unit of work)
//! - Read-only candidate feed over the upstream catalog
//! - Notification history with the dedup uniqueness constraint,
//!   suppression log, and quiet-hours deferral tracking
//! - User preference and tier lookups
//!
//! ## Example
//!
//! ```rust,ignore
//! use catalyst_db::Database;
//! use catalyst_core::{CreateSavedSearchRequest, Channel, FilterPredicate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/catalyst").await?;
//!
//!     let id = db.saved_searches.create(CreateSavedSearchRequest {
//!         user_id: user,
//!         name: "late stage oncology".to_string(),
//!         filter: FilterPredicate::new().with_phase(3),
//!         channels: vec![Channel::Email],
//!     }).await?;
//!
//!     println!("Created saved search: {id}");
//!     Ok(())
//! }
//! ```

pub mod candidates;
pub mod notifications;
pub mod pool;
pub mod preferences;
pub mod saved_searches;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use catalyst_core::*;

// Re-export repository implementations
pub use candidates::{CandidateBatch, PgCandidateFeed};
pub use notifications::PgNotificationRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use preferences::PgPreferencesRepository;
pub use saved_searches::PgSavedSearchRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Saved search repository.
    pub saved_searches: PgSavedSearchRepository,
    /// Read-only candidate feed.
    pub candidates: PgCandidateFeed,
    /// Notification history, suppression log, and deferrals.
    pub notifications: PgNotificationRepository,
    /// User preferences and tier lookups.
    pub preferences: PgPreferencesRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            saved_searches: PgSavedSearchRepository::new(pool.clone()),
            candidates: PgCandidateFeed::new(pool.clone()),
            notifications: PgNotificationRepository::new(pool.clone()),
            preferences: PgPreferencesRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
