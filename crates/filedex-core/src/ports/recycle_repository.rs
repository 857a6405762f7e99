//! Recycle repository port (driven/secondary port)
//!
//! Persistent storage for [`RecycleItem`] records. Records are detached
//! from the entry tree: they reference their former entries and parents by
//! id only, and nothing in the entry table references them.

use std::path::PathBuf;

use crate::domain::{RecycleId, RecycleItem};

use super::index_repository::RepositoryError;

/// Port trait for the recycle bin record set
#[async_trait::async_trait]
pub trait IRecycleRepository: Send + Sync {
    /// Stores records in one transaction; insertion order is kept as the
    /// deletion sequence
    async fn insert_items(&self, items: &[RecycleItem]) -> Result<(), RepositoryError>;

    /// Looks up a record by id
    async fn get_item(&self, id: RecycleId) -> Result<Option<RecycleItem>, RepositoryError>;

    /// Lists top-level records in deletion order
    async fn list_top_level(&self) -> Result<Vec<RecycleItem>, RepositoryError>;

    /// Lists every record, nested ones included, in deletion order
    async fn list_all(&self) -> Result<Vec<RecycleItem>, RepositoryError>;

    /// Lists the direct nested records of `parent`
    async fn list_children(&self, parent: RecycleId) -> Result<Vec<RecycleItem>, RepositoryError>;

    /// Deletes records in one transaction
    async fn delete_items(&self, ids: &[RecycleId]) -> Result<(), RepositoryError>;

    /// Rewrites the relocated path of each record in one transaction
    async fn update_relocated_paths(&self, updates: &[(RecycleId, PathBuf)]) -> Result<(), RepositoryError>;
}
