//! # remember-db
//!
//! PostgreSQL database layer for the remember link crawler.
//!
//! This crate provides:
//! - Connection pool management
//! - The link details repository (create-or-replace per bookmark)
//! - A job queue claimed with `FOR UPDATE SKIP LOCKED`
//!
//! ## Example
//!
//! ```rust,ignore
//! use remember_db::{defaults, Database, JobRepository, JobType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/remember").await?;
//!
//!     let job_id = db.jobs.queue(
//!         JobType::LinkCrawling,
//!         defaults::CRAWL_JOB_PRIORITY,
//!         Some(serde_json::json!({"url": "https://example.com", "linkId": "bm_1"})),
//!     ).await?;
//!
//!     println!("Queued crawl: {}", job_id);
//!     Ok(())
//! }
//! ```
pub mod jobs;
pub mod link_details;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) and other crates can use them
pub mod test_fixtures;

// Re-export core types
pub use remember_core::*;

// Re-export repository implementations
pub use jobs::PgJobRepository;
pub use link_details::PgLinkDetailsRepository;
pub use pool::PoolConfig;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Job repository for background processing.
    pub jobs: PgJobRepository,
    /// Link details repository written by crawls.
    pub link_details: PgLinkDetailsRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgJobRepository::new(pool.clone()),
            link_details: PgLinkDetailsRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = pool::connect(url, &config).await?;
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
