//! SQLite pool behind the index and recycle repositories
//!
//! Every connection enforces foreign keys so an entry can never point at a
//! parent row that is gone. File databases run in WAL mode; the daemon
//! reads listings while a tree operation commits.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::CacheError;

/// Connections opened against an index file
const FILE_CONNECTIONS: u32 = 5;

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const INITIAL_SCHEMA: &str = include_str!("migrations/20261016_initial.sql");

/// Shared SQLite pool holding the FileDex schema
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (or creates) the index database at `db_path`
    ///
    /// Missing parent directories are created and the schema is applied.
    ///
    /// # Errors
    /// `ConnectionFailed` when the file cannot be opened, `MigrationFailed`
    /// when the schema cannot be applied
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("cannot open {}: {e}", db_path.display())))?;

        apply_schema(&pool).await?;
        info!(path = %db_path.display(), connections = FILE_CONNECTIONS, "Index database opened");
        Ok(Self { pool })
    }

    /// Throwaway database for tests and dry runs
    ///
    /// Limited to one connection: each SQLite memory connection is its own
    /// database.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("cannot open in-memory database: {e}")))?;

        apply_schema(&pool).await?;
        debug!("In-memory index database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Creates the tables and indexes that are not there yet
async fn apply_schema(pool: &SqlitePool) -> Result<(), CacheError> {
    sqlx::raw_sql(INITIAL_SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| CacheError::MigrationFailed(format!("initial schema: {e}")))?;
    debug!("Index schema applied");
    Ok(())
}
