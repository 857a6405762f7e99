//! Recycle bin records
//!
//! A [`RecycleItem`] describes one soft-deleted node. Deleting a folder
//! produces one top-level item plus one nested item per descendant; nested
//! items point at the record of their former parent through `parent_item`,
//! so the deleted subtree can be rebuilt on restore without consulting the
//! entry tree, which no longer holds any of those nodes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{Entry, EntryKind};
use super::newtypes::{ActorId, EntryId, RecycleId};

/// A soft-deleted file or folder awaiting restore or purge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecycleItem {
    id: RecycleId,
    entry_id: EntryId,
    name: String,
    kind: EntryKind,
    size: u64,
    owner_id: ActorId,
    deleted_by: ActorId,
    deleted_at: DateTime<Utc>,
    original_path: PathBuf,
    relocated_path: PathBuf,
    parent_hint: Option<EntryId>,
    parent_item: Option<RecycleId>,
}

impl RecycleItem {
    /// Builds the record for `entry` as it is being soft-deleted
    ///
    /// `id` is supplied by the caller so that nested records can reference
    /// their parent record before any of them is stored.
    pub fn from_entry(
        id: RecycleId,
        entry: &Entry,
        deleted_by: ActorId,
        deleted_at: DateTime<Utc>,
        relocated_path: PathBuf,
        parent_item: Option<RecycleId>,
    ) -> Self {
        Self {
            id,
            entry_id: entry.id(),
            name: entry.name().to_string(),
            kind: entry.kind(),
            size: entry.size(),
            owner_id: entry.owner_id().clone(),
            deleted_by,
            deleted_at,
            original_path: entry.path().to_path_buf(),
            relocated_path,
            parent_hint: entry.parent_id(),
            parent_item,
        }
    }

    /// Rebuilds a record from persisted state
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: RecycleId,
        entry_id: EntryId,
        name: String,
        kind: EntryKind,
        size: u64,
        owner_id: ActorId,
        deleted_by: ActorId,
        deleted_at: DateTime<Utc>,
        original_path: PathBuf,
        relocated_path: PathBuf,
        parent_hint: Option<EntryId>,
        parent_item: Option<RecycleId>,
    ) -> Self {
        Self {
            id,
            entry_id,
            name,
            kind,
            size,
            owner_id,
            deleted_by,
            deleted_at,
            original_path,
            relocated_path,
            parent_hint,
            parent_item,
        }
    }

    /// Returns the record id
    pub fn id(&self) -> RecycleId {
        self.id
    }

    /// Returns the id the entry had before deletion
    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    /// Returns the name at deletion time
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the kind of the deleted node
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Returns the recorded size
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the original owner
    pub fn owner_id(&self) -> &ActorId {
        &self.owner_id
    }

    /// Returns the actor that deleted the node
    pub fn deleted_by(&self) -> &ActorId {
        &self.deleted_by
    }

    /// Returns the deletion timestamp
    pub fn deleted_at(&self) -> DateTime<Utc> {
        self.deleted_at
    }

    /// Returns the disk path before deletion
    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    /// Returns where the backing data lives now
    pub fn relocated_path(&self) -> &Path {
        &self.relocated_path
    }

    /// Returns the parent folder id before deletion
    pub fn parent_hint(&self) -> Option<EntryId> {
        self.parent_hint
    }

    /// Returns the record of the deleted parent, for nested items
    pub fn parent_item(&self) -> Option<RecycleId> {
        self.parent_item
    }

    /// Returns true for items the user deleted directly
    pub fn is_top_level(&self) -> bool {
        self.parent_item.is_none()
    }
}
