//! Index entries: the files and folders of the managed tree
//!
//! An [`Entry`] is the index-side record of one file or folder under the
//! storage root. Entries reference their parent by id only; children are
//! always computed by querying the index, never stored on the parent.
//!
//! ## Design Notes
//!
//! - Fields are private. Mutation goes through methods that keep `name`
//!   and `name_key` in step and bump `modified_at`.
//! - `path` is the materialized absolute disk path. It is derived data:
//!   the index keeps it equal to the join of the parent chain's names, and
//!   [`crate::PathResolver`] rewrites it when an ancestor is renamed or moved.
//! - Folders always carry `size = 0`; aggregate folder sizes are computed
//!   on demand from descendant files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ActorId, EntryId};
use crate::naming::name_key;

// ============================================================================
// EntryKind
// ============================================================================

/// Whether an entry is a regular file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file with byte content
    File,
    /// Directory that may hold child entries
    Folder,
}

impl EntryKind {
    /// Stable lowercase representation used in storage and output
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Folder => "folder",
        }
    }

    /// Returns true for [`EntryKind::Folder`]
    pub fn is_folder(&self) -> bool {
        matches!(self, EntryKind::Folder)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(EntryKind::File),
            "folder" => Ok(EntryKind::Folder),
            other => Err(DomainError::InvalidKind(other.to_string())),
        }
    }
}

// ============================================================================
// Entry
// ============================================================================

/// A file or folder tracked by the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    id: EntryId,
    name: String,
    name_key: String,
    kind: EntryKind,
    parent_id: Option<EntryId>,
    path: PathBuf,
    size: u64,
    starred: bool,
    owner_id: ActorId,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl Entry {
    fn new(
        name: impl Into<String>,
        kind: EntryKind,
        parent_id: Option<EntryId>,
        path: PathBuf,
        size: u64,
        owner_id: ActorId,
    ) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: EntryId::new(),
            name_key: name_key(&name),
            name,
            kind,
            parent_id,
            path,
            size,
            starred: false,
            owner_id,
            created_at: now,
            modified_at: now,
        }
    }

    /// Creates a fresh folder entry with a new id
    pub fn new_folder(
        name: impl Into<String>,
        parent_id: Option<EntryId>,
        path: PathBuf,
        owner_id: ActorId,
    ) -> Self {
        Self::new(name, EntryKind::Folder, parent_id, path, 0, owner_id)
    }

    /// Creates a fresh file entry with a new id
    pub fn new_file(
        name: impl Into<String>,
        parent_id: Option<EntryId>,
        path: PathBuf,
        size: u64,
        owner_id: ActorId,
    ) -> Self {
        Self::new(name, EntryKind::File, parent_id, path, size, owner_id)
    }

    /// Creates a fresh entry of the given kind
    ///
    /// Folder sizes are forced to zero.
    pub fn with_kind(
        kind: EntryKind,
        name: impl Into<String>,
        parent_id: Option<EntryId>,
        path: PathBuf,
        size: u64,
        owner_id: ActorId,
    ) -> Self {
        match kind {
            EntryKind::Folder => Self::new_folder(name, parent_id, path, owner_id),
            EntryKind::File => Self::new_file(name, parent_id, path, size, owner_id),
        }
    }

    /// Rebuilds an entry from persisted state
    ///
    /// Used by storage adapters; performs no validation beyond recomputing
    /// the name key.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: EntryId,
        name: String,
        kind: EntryKind,
        parent_id: Option<EntryId>,
        path: PathBuf,
        size: u64,
        starred: bool,
        owner_id: ActorId,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name_key: name_key(&name),
            name,
            kind,
            parent_id,
            path,
            size,
            starred,
            owner_id,
            created_at,
            modified_at,
        }
    }

    // --- Getters ---

    /// Returns the entry's identifier
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Returns the display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the case-folded name used for sibling uniqueness
    pub fn name_key(&self) -> &str {
        &self.name_key
    }

    /// Returns the entry kind
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Returns true if this entry is a folder
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    /// Returns the parent folder id, `None` at root level
    pub fn parent_id(&self) -> Option<EntryId> {
        self.parent_id
    }

    /// Returns the materialized absolute disk path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the recorded size in bytes (always 0 for folders)
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns whether the entry is starred
    pub fn is_starred(&self) -> bool {
        self.starred
    }

    /// Returns the actor that created the entry
    pub fn owner_id(&self) -> &ActorId {
        &self.owner_id
    }

    /// Returns the creation timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last modification timestamp
    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    // --- Mutators ---

    /// Changes the display name and name key
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.name_key = name_key(&self.name);
        self.touch();
    }

    /// Re-parents the entry under a new folder with a new name and path
    pub fn relocate(&mut self, parent_id: Option<EntryId>, name: impl Into<String>, path: PathBuf) {
        self.parent_id = parent_id;
        self.path = path;
        self.rename(name);
    }

    /// Replaces the materialized path without touching `modified_at`
    pub fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    /// Sets the starred flag
    pub fn set_starred(&mut self, starred: bool) {
        self.starred = starred;
    }

    /// Flips the starred flag, returning the new value
    pub fn toggle_starred(&mut self) -> bool {
        self.starred = !self.starred;
        self.starred
    }

    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.path.display(), self.id)
    }
}

// ============================================================================
// EntryProperties
// ============================================================================

/// Metadata reported by the `properties` operation
///
/// Timestamps come from the disk stat when available and fall back to the
/// index values otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryProperties {
    /// Entry identifier
    pub id: EntryId,
    /// Display name
    pub name: String,
    /// Entry kind
    pub kind: EntryKind,
    /// Absolute disk path
    pub path: PathBuf,
    /// File size on disk, or the summed size of descendant files for folders
    pub size: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub modified_at: DateTime<Utc>,
    /// Last access timestamp
    pub accessed_at: Option<DateTime<Utc>>,
    /// Whether the disk object is read-only
    pub readonly: bool,
    /// Unix permission bits, when the platform reports them
    pub mode: Option<u32>,
    /// Starred flag
    pub starred: bool,
    /// Owning actor
    pub owner_id: ActorId,
}

impl EntryProperties {
    /// Renders the permission bits as `rwxr-xr-x`, or `-` when unknown
    pub fn permissions(&self) -> String {
        let Some(mode) = self.mode else {
            return if self.readonly { "r--" } else { "rw-" }.to_string();
        };
        let mut out = String::with_capacity(9);
        for shift in [6u32, 3, 0] {
            let bits = (mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ActorId {
        ActorId::new("alice").unwrap()
    }

    #[test]
    fn test_new_folder_has_zero_size() {
        let entry = Entry::with_kind(
            EntryKind::Folder,
            "Work",
            None,
            PathBuf::from("/srv/Work"),
            42,
            alice(),
        );
        assert!(entry.is_folder());
        assert_eq!(entry.size(), 0);
        assert!(!entry.is_starred());
        assert_eq!(entry.name_key(), "work");
    }

    #[test]
    fn test_new_file_keeps_size() {
        let entry = Entry::new_file("plan.txt", None, PathBuf::from("/srv/plan.txt"), 12, alice());
        assert_eq!(entry.kind(), EntryKind::File);
        assert_eq!(entry.size(), 12);
    }

    #[test]
    fn test_rename_updates_key() {
        let mut entry = Entry::new_folder("Work", None, PathBuf::from("/srv/Work"), alice());
        let before = entry.modified_at();
        entry.rename("Archive");
        assert_eq!(entry.name(), "Archive");
        assert_eq!(entry.name_key(), "archive");
        assert!(entry.modified_at() >= before);
    }

    #[test]
    fn test_relocate() {
        let parent = EntryId::new();
        let mut entry = Entry::new_file("a.txt", None, PathBuf::from("/srv/a.txt"), 1, alice());
        entry.relocate(Some(parent), "a_copy1.txt", PathBuf::from("/srv/P/a_copy1.txt"));
        assert_eq!(entry.parent_id(), Some(parent));
        assert_eq!(entry.name(), "a_copy1.txt");
        assert_eq!(entry.path(), Path::new("/srv/P/a_copy1.txt"));
    }

    #[test]
    fn test_toggle_starred() {
        let mut entry = Entry::new_folder("Work", None, PathBuf::from("/srv/Work"), alice());
        assert!(entry.toggle_starred());
        assert!(!entry.toggle_starred());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("file".parse::<EntryKind>().unwrap(), EntryKind::File);
        assert_eq!("folder".parse::<EntryKind>().unwrap(), EntryKind::Folder);
        assert!("symlink".parse::<EntryKind>().is_err());
    }

    #[test]
    fn test_from_parts_recomputes_key() {
        let now = Utc::now();
        let entry = Entry::from_parts(
            EntryId::new(),
            "Docs".to_string(),
            EntryKind::Folder,
            None,
            PathBuf::from("/srv/Docs"),
            0,
            true,
            alice(),
            now,
            now,
        );
        assert_eq!(entry.name_key(), "docs");
        assert!(entry.is_starred());
    }

    #[test]
    fn test_permissions_rendering() {
        let now = Utc::now();
        let props = EntryProperties {
            id: EntryId::new(),
            name: "a".into(),
            kind: EntryKind::File,
            path: PathBuf::from("/srv/a"),
            size: 0,
            created_at: now,
            modified_at: now,
            accessed_at: None,
            readonly: false,
            mode: Some(0o754),
            starred: false,
            owner_id: alice(),
        };
        assert_eq!(props.permissions(), "rwxr-xr--");
    }
}
