//! SQLite implementation of IIndexRepository
//!
//! The `entries` table is the arena: one row per entry, parent links as
//! nullable foreign keys, and a unique expression index on
//! `(IFNULL(parent_id, ''), name_key)` that enforces case-insensitive
//! sibling uniqueness even for writers racing past the in-process locks.

use std::path::Path;

use sqlx::{Sqlite, SqlitePool, Transaction};

use filedex_core::domain::{Entry, EntryId};
use filedex_core::ports::{IIndexRepository, RepositoryError};

use crate::rows::{entry_from_row, path_to_string};
use crate::CacheError;

/// SQLite-based implementation of the index repository port
pub struct SqliteIndexRepository {
    pool: SqlitePool,
}

impl SqliteIndexRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_in(tx: &mut Transaction<'_, Sqlite>, entry: &Entry) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT INTO entries \
             (id, parent_id, name, name_key, kind, path, size, starred, owner_id, \
              created_at, modified_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id().to_string())
        .bind(entry.parent_id().map(|p| p.to_string()))
        .bind(entry.name())
        .bind(entry.name_key())
        .bind(entry.kind().as_str())
        .bind(path_to_string(entry.path()))
        .bind(entry.size() as i64)
        .bind(entry.is_starred())
        .bind(entry.owner_id().as_str())
        .bind(entry.created_at().to_rfc3339())
        .bind(entry.modified_at().to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_in(tx: &mut Transaction<'_, Sqlite>, entry: &Entry) -> Result<(), CacheError> {
        let result = sqlx::query(
            "UPDATE entries SET parent_id = ?, name = ?, name_key = ?, path = ?, size = ?, \
             starred = ?, modified_at = ? WHERE id = ?",
        )
        .bind(entry.parent_id().map(|p| p.to_string()))
        .bind(entry.name())
        .bind(entry.name_key())
        .bind(path_to_string(entry.path()))
        .bind(entry.size() as i64)
        .bind(entry.is_starred())
        .bind(entry.modified_at().to_rfc3339())
        .bind(entry.id().to_string())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CacheError::QueryFailed(format!(
                "Entry {} vanished during update",
                entry.id()
            )));
        }
        Ok(())
    }

    async fn fetch_one_entry(
        &self,
        sql: &str,
        binds: &[String],
    ) -> Result<Option<Entry>, CacheError> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = query.bind(bind);
        }
        match query.fetch_optional(&self.pool).await? {
            Some(ref row) => Ok(Some(entry_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn fetch_entries(&self, sql: &str, binds: &[String]) -> Result<Vec<Entry>, CacheError> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }
}

/// Escapes LIKE wildcards so user input matches literally
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait::async_trait]
impl IIndexRepository for SqliteIndexRepository {
    async fn insert_entry(&self, entry: &Entry) -> Result<(), RepositoryError> {
        self.insert_entries(std::slice::from_ref(entry)).await
    }

    async fn insert_entries(&self, entries: &[Entry]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;
        for entry in entries {
            Self::insert_in(&mut tx, entry).await?;
        }
        tx.commit().await.map_err(CacheError::from)?;
        tracing::trace!(count = entries.len(), "Inserted entries");
        Ok(())
    }

    async fn update_entries(&self, entries: &[Entry]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;
        for entry in entries {
            Self::update_in(&mut tx, entry).await?;
        }
        tx.commit().await.map_err(CacheError::from)?;
        tracing::trace!(count = entries.len(), "Updated entries");
        Ok(())
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>, RepositoryError> {
        Ok(self
            .fetch_one_entry("SELECT * FROM entries WHERE id = ?", &[id.to_string()])
            .await?)
    }

    async fn get_child_by_name(
        &self,
        parent: Option<EntryId>,
        name_key: &str,
    ) -> Result<Option<Entry>, RepositoryError> {
        let parent = parent.map(|p| p.to_string()).unwrap_or_default();
        Ok(self
            .fetch_one_entry(
                "SELECT * FROM entries WHERE IFNULL(parent_id, '') = ? AND name_key = ?",
                &[parent, name_key.to_string()],
            )
            .await?)
    }

    async fn list_children(&self, parent: Option<EntryId>) -> Result<Vec<Entry>, RepositoryError> {
        let parent = parent.map(|p| p.to_string()).unwrap_or_default();
        Ok(self
            .fetch_entries(
                "SELECT * FROM entries WHERE IFNULL(parent_id, '') = ? ORDER BY name_key, id",
                &[parent],
            )
            .await?)
    }

    async fn get_entry_by_path(&self, path: &Path) -> Result<Option<Entry>, RepositoryError> {
        Ok(self
            .fetch_one_entry("SELECT * FROM entries WHERE path = ?", &[path_to_string(path)])
            .await?)
    }

    async fn delete_entries(&self, ids: &[EntryId]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;
        for id in ids {
            sqlx::query("DELETE FROM entries WHERE id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(CacheError::from)?;
        }
        tx.commit().await.map_err(CacheError::from)?;
        tracing::trace!(count = ids.len(), "Deleted entries");
        Ok(())
    }

    async fn search(&self, needle: &str) -> Result<Vec<Entry>, RepositoryError> {
        Ok(self
            .fetch_entries(
                "SELECT * FROM entries WHERE name_key LIKE ? ESCAPE '\\' \
                 ORDER BY starred DESC, name_key, path",
                &[like_pattern(needle)],
            )
            .await?)
    }

    async fn list_all(&self) -> Result<Vec<Entry>, RepositoryError> {
        Ok(self
            .fetch_entries("SELECT * FROM entries ORDER BY path", &[])
            .await?)
    }
}
