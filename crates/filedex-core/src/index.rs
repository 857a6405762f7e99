//! The authoritative entry tree
//!
//! [`Index`] layers tree semantics over an [`IIndexRepository`]: lookups
//! that fail with `NotFound`, ancestor walks with corruption detection,
//! breadth-first subtree snapshots, and the name-uniqueness check.
//!
//! ## Design Notes
//!
//! - The store is an arena keyed by id. Children are always a query on
//!   `parent_id`; nothing caches them.
//! - Recursive work is an explicit loop over ids with a visited set, so a
//!   corrupt parent cycle surfaces as [`CoreError::BrokenChain`] instead of
//!   an endless walk.
//! - Callers hold the locks. `Index` itself never locks.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use crate::domain::{Entry, EntryId, EntryKind};
use crate::error::CoreError;
use crate::naming::name_key;
use crate::ports::{IIndexRepository, RepositoryError};

/// Tree view over the persistent entry store
#[derive(Clone)]
pub struct Index {
    repo: Arc<dyn IIndexRepository>,
}

impl Index {
    /// Wraps a repository
    pub fn new(repo: Arc<dyn IIndexRepository>) -> Self {
        Self { repo }
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Returns the entry with `id`, or `NotFound`
    pub async fn get(&self, id: EntryId) -> Result<Entry, CoreError> {
        self.find(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("entry {id}")))
    }

    /// Returns the entry with `id`, if any
    pub async fn find(&self, id: EntryId) -> Result<Option<Entry>, CoreError> {
        Ok(self.repo.get_entry(id).await?)
    }

    /// Resolves a parent reference to its folder entry
    ///
    /// `None` is the root level and always valid.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `InvalidOperation` when it names a file
    pub async fn require_folder(&self, id: Option<EntryId>) -> Result<Option<Entry>, CoreError> {
        let Some(id) = id else {
            return Ok(None);
        };
        let entry = self
            .find(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("parent folder {id}")))?;
        if !entry.is_folder() {
            return Err(CoreError::InvalidOperation(format!(
                "{} is a file, not a folder",
                entry.name()
            )));
        }
        Ok(Some(entry))
    }

    /// Lists the children of `parent`, ordered by name key
    pub async fn children(&self, parent: Option<EntryId>) -> Result<Vec<Entry>, CoreError> {
        Ok(self.repo.list_children(parent).await?)
    }

    /// Returns the child of `parent` whose name matches case-insensitively
    pub async fn child_named(
        &self,
        parent: Option<EntryId>,
        name: &str,
    ) -> Result<Option<Entry>, CoreError> {
        Ok(self.repo.get_child_by_name(parent, &name_key(name)).await?)
    }

    /// Fails with `Conflict` if an active sibling other than `except` holds
    /// `name`
    pub async fn ensure_name_free(
        &self,
        parent: Option<EntryId>,
        name: &str,
        except: Option<EntryId>,
    ) -> Result<(), CoreError> {
        match self.child_named(parent, name).await? {
            Some(existing) if Some(existing.id()) != except => Err(CoreError::Conflict(format!(
                "an entry named {:?} already exists here",
                existing.name()
            ))),
            _ => Ok(()),
        }
    }

    /// Returns an entry by its materialized path
    pub async fn find_by_path(&self, path: &Path) -> Result<Option<Entry>, CoreError> {
        Ok(self.repo.get_entry_by_path(path).await?)
    }

    /// Case-insensitive name search, starred entries first
    pub async fn search(&self, needle: &str) -> Result<Vec<Entry>, CoreError> {
        Ok(self.repo.search(needle).await?)
    }

    /// Every entry in the index
    pub async fn all(&self) -> Result<Vec<Entry>, CoreError> {
        Ok(self.repo.list_all().await?)
    }

    // ========================================================================
    // Tree walks
    // ========================================================================

    /// Returns the ancestors of `entry`, nearest first
    ///
    /// # Errors
    /// `BrokenChain` naming the entry whose parent is missing, or the first
    /// entry revisited when the chain loops
    pub async fn ancestors(&self, entry: &Entry) -> Result<Vec<Entry>, CoreError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([entry.id()]);
        let mut child = entry.id();
        let mut next = entry.parent_id();

        while let Some(parent_id) = next {
            if !visited.insert(parent_id) {
                return Err(CoreError::BrokenChain(parent_id));
            }
            let parent = self
                .find(parent_id)
                .await?
                .ok_or(CoreError::BrokenChain(child))?;
            child = parent.id();
            next = parent.parent_id();
            chain.push(parent);
        }
        Ok(chain)
    }

    /// Returns `folder` followed by its ancestor ids, nearest first
    ///
    /// Empty for the root level.
    pub async fn ancestor_ids(&self, folder: Option<EntryId>) -> Result<Vec<EntryId>, CoreError> {
        let Some(id) = folder else {
            return Ok(Vec::new());
        };
        let entry = self.get(id).await?;
        let mut ids = vec![id];
        ids.extend(self.ancestors(&entry).await?.iter().map(Entry::id));
        Ok(ids)
    }

    /// Returns true if `candidate` is `ancestor` or lies in its subtree
    ///
    /// Walks only the candidate's parent chain.
    pub async fn is_within(&self, candidate: EntryId, ancestor: EntryId) -> Result<bool, CoreError> {
        if candidate == ancestor {
            return Ok(true);
        }
        let entry = self.get(candidate).await?;
        Ok(self
            .ancestors(&entry)
            .await?
            .iter()
            .any(|a| a.id() == ancestor))
    }

    /// Snapshot of `root` and all its descendants, breadth-first
    ///
    /// Parents always precede their children; siblings follow name-key
    /// order.
    pub async fn subtree(&self, root: &Entry) -> Result<Vec<Entry>, CoreError> {
        let mut out = vec![root.clone()];
        let mut visited = HashSet::from([root.id()]);
        let mut queue = VecDeque::from([root.clone()]);

        while let Some(folder) = queue.pop_front() {
            if !folder.is_folder() {
                continue;
            }
            for child in self.children(Some(folder.id())).await? {
                if !visited.insert(child.id()) {
                    return Err(CoreError::BrokenChain(child.id()));
                }
                queue.push_back(child.clone());
                out.push(child);
            }
        }
        Ok(out)
    }

    /// Sum of the recorded sizes of all files below `folder`
    pub async fn folder_size(&self, folder: &Entry) -> Result<u64, CoreError> {
        Ok(self
            .subtree(folder)
            .await?
            .iter()
            .filter(|e| e.kind() == EntryKind::File)
            .map(Entry::size)
            .sum())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Inserts a new entry
    ///
    /// # Errors
    /// `Conflict` if a sibling won the name first
    pub async fn insert(&self, entry: &Entry) -> Result<(), CoreError> {
        self.repo
            .insert_entry(entry)
            .await
            .map_err(|e| duplicate_as_conflict(e, entry.name()))
    }

    /// Inserts several entries atomically, parents first
    pub async fn insert_all(&self, entries: &[Entry]) -> Result<(), CoreError> {
        Ok(self.repo.insert_entries(entries).await?)
    }

    /// Persists modified entries in one transaction
    pub async fn commit(&self, entries: &[Entry]) -> Result<(), CoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        Ok(self.repo.update_entries(entries).await?)
    }

    /// Removes entries in one transaction; pass children before parents
    pub async fn remove(&self, ids: &[EntryId]) -> Result<(), CoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        Ok(self.repo.delete_entries(ids).await?)
    }

    /// Sets the starred flag and returns the updated entry
    pub async fn set_starred(&self, id: EntryId, starred: bool) -> Result<Entry, CoreError> {
        let mut entry = self.get(id).await?;
        if entry.is_starred() != starred {
            entry.set_starred(starred);
            self.commit(std::slice::from_ref(&entry)).await?;
        }
        Ok(entry)
    }
}

fn duplicate_as_conflict(err: RepositoryError, name: &str) -> CoreError {
    match err {
        RepositoryError::Duplicate(_) => {
            CoreError::Conflict(format!("an entry named {name:?} already exists here"))
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActorId;
    use crate::test_support::MemoryIndexRepository;
    use std::path::PathBuf;

    fn owner() -> ActorId {
        ActorId::new("alice").unwrap()
    }

    async fn folder(index: &Index, name: &str, parent: Option<&Entry>) -> Entry {
        let path = match parent {
            Some(p) => p.path().join(name),
            None => PathBuf::from("/srv").join(name),
        };
        let entry = Entry::new_folder(name, parent.map(Entry::id), path, owner());
        index.insert(&entry).await.unwrap();
        entry
    }

    fn index() -> Index {
        Index::new(Arc::new(MemoryIndexRepository::default()))
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let index = index();
        let err = index.get(EntryId::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_insert_duplicate_name_conflicts() {
        let index = index();
        folder(&index, "Work", None).await;
        let dup = Entry::new_folder("work", None, PathBuf::from("/srv/work"), owner());
        let err = index.insert(&dup).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_require_folder_rejects_file() {
        let index = index();
        let file = Entry::new_file("a.txt", None, PathBuf::from("/srv/a.txt"), 1, owner());
        index.insert(&file).await.unwrap();

        assert!(index.require_folder(None).await.unwrap().is_none());
        let err = index.require_folder(Some(file.id())).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_ancestors_and_is_within() {
        let index = index();
        let a = folder(&index, "A", None).await;
        let b = folder(&index, "B", Some(&a)).await;
        let c = folder(&index, "C", Some(&b)).await;

        let chain: Vec<_> = index.ancestors(&c).await.unwrap().iter().map(Entry::id).collect();
        assert_eq!(chain, vec![b.id(), a.id()]);
        assert_eq!(
            index.ancestor_ids(Some(c.id())).await.unwrap(),
            vec![c.id(), b.id(), a.id()]
        );

        assert!(index.is_within(c.id(), a.id()).await.unwrap());
        assert!(index.is_within(a.id(), a.id()).await.unwrap());
        assert!(!index.is_within(a.id(), c.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_ancestors_detects_missing_parent() {
        let orphan = Entry::new_folder(
            "Orphan",
            Some(EntryId::new()),
            PathBuf::from("/srv/x/Orphan"),
            owner(),
        );
        let repo = MemoryIndexRepository::default();
        repo.force_insert(orphan.clone());
        let index = Index::new(Arc::new(repo));

        let err = index.ancestors(&orphan).await.unwrap_err();
        assert_eq!(err, CoreError::BrokenChain(orphan.id()));
    }

    #[tokio::test]
    async fn test_subtree_is_parent_first() {
        let index = index();
        let a = folder(&index, "A", None).await;
        let b = folder(&index, "B", Some(&a)).await;
        let file = Entry::new_file("f.txt", Some(b.id()), b.path().join("f.txt"), 5, owner());
        index.insert(&file).await.unwrap();
        let other = Entry::new_file("g.txt", Some(a.id()), a.path().join("g.txt"), 7, owner());
        index.insert(&other).await.unwrap();

        let ids: Vec<_> = index.subtree(&a).await.unwrap().iter().map(Entry::id).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], a.id());
        let pos = |id| ids.iter().position(|x| *x == id).unwrap();
        assert!(pos(b.id()) < pos(file.id()));

        assert_eq!(index.folder_size(&a).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_ensure_name_free_allows_self() {
        let index = index();
        let a = folder(&index, "A", None).await;
        assert!(index.ensure_name_free(None, "a", Some(a.id())).await.is_ok());
        assert!(index.ensure_name_free(None, "a", None).await.is_err());
    }

    #[tokio::test]
    async fn test_set_starred() {
        let index = index();
        let a = folder(&index, "A", None).await;
        let starred = index.set_starred(a.id(), true).await.unwrap();
        assert!(starred.is_starred());
        assert!(index.get(a.id()).await.unwrap().is_starred());
    }
}
