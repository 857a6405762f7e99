//! SQLite implementation of IRecycleRepository
//!
//! Records carry a monotonically increasing `seq` assigned at insertion, so
//! listings follow deletion order even when timestamps collide.

use std::path::PathBuf;

use sqlx::SqlitePool;

use filedex_core::domain::{RecycleId, RecycleItem};
use filedex_core::ports::{IRecycleRepository, RepositoryError};

use crate::rows::{path_to_string, recycle_item_from_row};
use crate::CacheError;

/// SQLite-based implementation of the recycle repository port
pub struct SqliteRecycleRepository {
    pool: SqlitePool,
}

impl SqliteRecycleRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_items(&self, sql: &str, bind: Option<String>) -> Result<Vec<RecycleItem>, CacheError> {
        let mut query = sqlx::query(sql);
        if let Some(bind) = bind {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(recycle_item_from_row).collect()
    }
}

#[async_trait::async_trait]
impl IRecycleRepository for SqliteRecycleRepository {
    async fn insert_items(&self, items: &[RecycleItem]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;
        for item in items {
            sqlx::query(
                "INSERT INTO recycle_items \
                 (id, entry_id, name, kind, size, owner_id, deleted_by, deleted_at, seq, \
                  original_path, relocated_path, parent_hint, parent_item) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, \
                         (SELECT IFNULL(MAX(seq), 0) + 1 FROM recycle_items), ?, ?, ?, ?)",
            )
            .bind(item.id().to_string())
            .bind(item.entry_id().to_string())
            .bind(item.name())
            .bind(item.kind().as_str())
            .bind(item.size() as i64)
            .bind(item.owner_id().as_str())
            .bind(item.deleted_by().as_str())
            .bind(item.deleted_at().to_rfc3339())
            .bind(path_to_string(item.original_path()))
            .bind(path_to_string(item.relocated_path()))
            .bind(item.parent_hint().map(|p| p.to_string()))
            .bind(item.parent_item().map(|p| p.to_string()))
            .execute(&mut *tx)
            .await
            .map_err(CacheError::from)?;
        }
        tx.commit().await.map_err(CacheError::from)?;
        tracing::trace!(count = items.len(), "Stored recycle items");
        Ok(())
    }

    async fn get_item(&self, id: RecycleId) -> Result<Option<RecycleItem>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM recycle_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::from)?;

        match row {
            Some(ref r) => Ok(Some(recycle_item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_top_level(&self) -> Result<Vec<RecycleItem>, RepositoryError> {
        Ok(self
            .fetch_items(
                "SELECT * FROM recycle_items WHERE parent_item IS NULL ORDER BY seq",
                None,
            )
            .await?)
    }

    async fn list_all(&self) -> Result<Vec<RecycleItem>, RepositoryError> {
        Ok(self
            .fetch_items("SELECT * FROM recycle_items ORDER BY seq", None)
            .await?)
    }

    async fn list_children(&self, parent: RecycleId) -> Result<Vec<RecycleItem>, RepositoryError> {
        Ok(self
            .fetch_items(
                "SELECT * FROM recycle_items WHERE parent_item = ? ORDER BY seq",
                Some(parent.to_string()),
            )
            .await?)
    }

    async fn delete_items(&self, ids: &[RecycleId]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;
        for id in ids {
            sqlx::query("DELETE FROM recycle_items WHERE id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(CacheError::from)?;
        }
        tx.commit().await.map_err(CacheError::from)?;
        tracing::trace!(count = ids.len(), "Removed recycle items");
        Ok(())
    }

    async fn update_relocated_paths(&self, updates: &[(RecycleId, PathBuf)]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;
        for (id, path) in updates {
            sqlx::query("UPDATE recycle_items SET relocated_path = ? WHERE id = ?")
                .bind(path_to_string(path))
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(CacheError::from)?;
        }
        tx.commit().await.map_err(CacheError::from)?;
        tracing::trace!(count = updates.len(), "Repointed recycle items");
        Ok(())
    }
}
