//! FileDex Cache - Index persistence
//!
//! SQLite-backed storage for:
//! - The entry tree (`entries` table)
//! - Recycle bin records (`recycle_items` table)
//!
//! ## Architecture
//!
//! This crate implements the `IIndexRepository` and `IRecycleRepository`
//! ports from `filedex-core` using SQLite as the storage backend. It is a
//! driven (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteIndexRepository`] - `IIndexRepository` implementation
//! - [`SqliteRecycleRepository`] - `IRecycleRepository` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use filedex_cache::{DatabasePool, SqliteIndexRepository};
//!
//! # async fn example() -> Result<(), filedex_cache::CacheError> {
//! let pool = DatabasePool::new(Path::new("/var/lib/filedex/index.db")).await?;
//! let repo = SqliteIndexRepository::new(pool.pool().clone());
//! // Use repo as IIndexRepository...
//! # Ok(())
//! # }
//! ```

pub mod index_repository;
pub mod pool;
pub mod recycle_repository;

mod rows;

use filedex_core::ports::RepositoryError;

pub use index_repository::SqliteIndexRepository;
pub use pool::DatabasePool;
pub use recycle_repository::SqliteRecycleRepository;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A UNIQUE constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A FOREIGN KEY constraint rejected the write
    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation => {
                    return CacheError::UniqueViolation(db.message().to_string())
                }
                sqlx::error::ErrorKind::ForeignKeyViolation => {
                    return CacheError::ForeignKeyViolation(db.message().to_string())
                }
                _ => {}
            }
        }
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<CacheError> for RepositoryError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::UniqueViolation(msg) => RepositoryError::Duplicate(msg),
            CacheError::ForeignKeyViolation(msg) => RepositoryError::MissingParent(msg),
            other => RepositoryError::Backend(other.to_string()),
        }
    }
}
