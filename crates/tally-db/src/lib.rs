//! # tally-db
//!
//! PostgreSQL storage layer for tally.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for users, categories, and transactions
//! - Filesystem blob storage for receipt uploads
//!
//! ## Example
//!
//! ```rust,ignore
//! use tally_db::{Database, TransactionRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/tally").await?;
//!     let recent = db.transactions.list_for_user(user_id, 50).await?;
//!     println!("{} transactions", recent.len());
//!     Ok(())
//! }
//! ```

pub mod categories;
pub mod file_storage;
pub mod pool;
pub mod transactions;
pub mod users;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

pub use tally_core::*;

pub use categories::PgCategoryRepository;
pub use file_storage::{validate_blob_path, FilesystemBackend, StorageBackend};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use transactions::PgTransactionRepository;
pub use users::PgUserRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub users: PgUserRepository,
    pub categories: PgCategoryRepository,
    pub transactions: PgTransactionRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            categories: PgCategoryRepository::new(pool.clone()),
            transactions: PgTransactionRepository::new(pool.clone()),
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
