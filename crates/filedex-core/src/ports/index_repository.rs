//! Index repository port (driven/secondary port)
//!
//! Persistent storage for [`Entry`] records. The repository is an
//! arena keyed by id: parent links are plain ids and children are
//! obtained by querying on `parent_id`, never stored on the parent.
//!
//! ## Design Notes
//!
//! - Errors are classified into [`RepositoryError`] because the core must
//!   tell a uniqueness violation (a lost race for a name) apart from a
//!   storage failure.
//! - Batch writes (`insert_entries`, `update_entries`, `delete_entries`)
//!   are all-or-nothing: implementations run them in one transaction.
//! - Sibling uniqueness is enforced on the case-folded name key, so a
//!   concurrent writer that slips past the in-process locks still loses
//!   with `Duplicate`.

use std::path::Path;

use thiserror::Error;

use crate::domain::{Entry, EntryId};

/// Classified repository failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// A uniqueness constraint (sibling name or path) was violated
    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    /// A referenced parent does not exist, or children still reference the row
    #[error("Missing parent: {0}")]
    MissingParent(String),

    /// Any other storage failure
    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Port trait for the persistent entry tree
#[async_trait::async_trait]
pub trait IIndexRepository: Send + Sync {
    /// Inserts a single new entry
    ///
    /// # Errors
    /// `Duplicate` if an active sibling holds the same name key,
    /// `MissingParent` if `parent_id` is unknown
    async fn insert_entry(&self, entry: &Entry) -> Result<(), RepositoryError>;

    /// Inserts several entries in one transaction, in the given order
    ///
    /// Callers pass parents before children.
    async fn insert_entries(&self, entries: &[Entry]) -> Result<(), RepositoryError>;

    /// Overwrites existing entries in one transaction
    async fn update_entries(&self, entries: &[Entry]) -> Result<(), RepositoryError>;

    /// Looks up an entry by id
    async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>, RepositoryError>;

    /// Looks up the child of `parent` whose case-folded name equals `name_key`
    async fn get_child_by_name(
        &self,
        parent: Option<EntryId>,
        name_key: &str,
    ) -> Result<Option<Entry>, RepositoryError>;

    /// Lists the children of `parent`, ordered by name key
    async fn list_children(&self, parent: Option<EntryId>) -> Result<Vec<Entry>, RepositoryError>;

    /// Looks up an entry by its materialized disk path
    async fn get_entry_by_path(&self, path: &Path) -> Result<Option<Entry>, RepositoryError>;

    /// Deletes entries in one transaction, in the given order
    ///
    /// Callers pass children before parents.
    async fn delete_entries(&self, ids: &[EntryId]) -> Result<(), RepositoryError>;

    /// Case-insensitive substring match on names, starred first then by name
    async fn search(&self, needle: &str) -> Result<Vec<Entry>, RepositoryError>;

    /// Returns every entry
    async fn list_all(&self) -> Result<Vec<Entry>, RepositoryError>;
}
