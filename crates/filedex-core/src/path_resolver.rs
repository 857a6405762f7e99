//! Mapping between entries and disk paths
//!
//! An entry's disk path is the storage root joined with the names along
//! its parent chain. The index stores that path on every entry so lookups
//! are O(1); [`PathResolver`] recomputes it from the chain and rewrites the
//! stored copies below a subtree whose root was renamed or moved.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::domain::{Entry, EntryId};
use crate::error::CoreError;
use crate::index::Index;

/// Resolves entries to absolute paths under a storage root
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Creates a resolver for `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a child called `name` inside `parent` (root level for `None`)
    ///
    /// Uses the parent's stored path.
    pub fn child_path(&self, parent: Option<&Entry>, name: &str) -> PathBuf {
        match parent {
            Some(parent) => parent.path().join(name),
            None => self.root.join(name),
        }
    }

    /// Recomputes the disk path of `entry` from its parent chain
    ///
    /// # Errors
    /// `BrokenChain` if an ancestor is missing or the chain loops
    pub async fn resolve(&self, index: &Index, entry: &Entry) -> Result<PathBuf, CoreError> {
        let ancestors = index.ancestors(entry).await?;
        let mut path = self.root.clone();
        for ancestor in ancestors.iter().rev() {
            path.push(ancestor.name());
        }
        path.push(entry.name());
        Ok(path)
    }

    /// Directory backing `parent_id`, or the storage root for `None`
    pub async fn resolve_folder(
        &self,
        index: &Index,
        parent_id: Option<EntryId>,
    ) -> Result<PathBuf, CoreError> {
        match index.require_folder(parent_id).await? {
            Some(folder) => self.resolve(index, &folder).await,
            None => Ok(self.root.clone()),
        }
    }

    /// Rewrites the stored paths of every descendant of `subtree_root`
    ///
    /// `subtree_root` must already carry its new path (`new_prefix`). Each
    /// descendant's path has `old_prefix` replaced by `new_prefix`; when a
    /// stored path does not match the expected shape it is rebuilt from the
    /// rewritten parent instead. Descendants are visited breadth-first with
    /// siblings in name-key order, and all of them are returned for the
    /// caller to commit in one transaction together with the root.
    pub async fn propagate_path_change(
        &self,
        index: &Index,
        subtree_root: &Entry,
        old_prefix: &Path,
        new_prefix: &Path,
    ) -> Result<Vec<Entry>, CoreError> {
        let mut updated = Vec::new();
        let mut queue = VecDeque::from([(subtree_root.id(), subtree_root.path().to_path_buf())]);

        while let Some((parent_id, parent_path)) = queue.pop_front() {
            for mut child in index.children(Some(parent_id)).await? {
                let expected = parent_path.join(child.name());
                let rewritten = child
                    .path()
                    .strip_prefix(old_prefix)
                    .ok()
                    .map(|rest| new_prefix.join(rest));

                let new_path = match rewritten {
                    Some(path) if path == expected => path,
                    _ => {
                        warn!(
                            entry_id = %child.id(),
                            stored = %child.path().display(),
                            rebuilt = %expected.display(),
                            "Stored path out of step with parent chain, rebuilding"
                        );
                        expected
                    }
                };

                child.set_path(new_path.clone());
                if child.is_folder() {
                    queue.push_back((child.id(), new_path));
                }
                updated.push(child);
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActorId;
    use crate::test_support::MemoryIndexRepository;
    use std::sync::Arc;

    fn owner() -> ActorId {
        ActorId::new("alice").unwrap()
    }

    fn setup() -> (Index, PathResolver) {
        (
            Index::new(Arc::new(MemoryIndexRepository::default())),
            PathResolver::new("/srv/storage"),
        )
    }

    async fn add(index: &Index, resolver: &PathResolver, entry: Entry) -> Entry {
        let parent = index.require_folder(entry.parent_id()).await.unwrap();
        assert_eq!(
            entry.path(),
            resolver.child_path(parent.as_ref(), entry.name())
        );
        index.insert(&entry).await.unwrap();
        entry
    }

    #[tokio::test]
    async fn test_resolve_matches_child_path() {
        let (index, resolver) = setup();
        let work = add(
            &index,
            &resolver,
            Entry::new_folder("Work", None, PathBuf::from("/srv/storage/Work"), owner()),
        )
        .await;
        let plan = add(
            &index,
            &resolver,
            Entry::new_file(
                "plan.txt",
                Some(work.id()),
                PathBuf::from("/srv/storage/Work/plan.txt"),
                3,
                owner(),
            ),
        )
        .await;

        assert_eq!(
            resolver.resolve(&index, &plan).await.unwrap(),
            PathBuf::from("/srv/storage/Work/plan.txt")
        );
        assert_eq!(
            resolver.resolve_folder(&index, Some(work.id())).await.unwrap(),
            PathBuf::from("/srv/storage/Work")
        );
        assert_eq!(
            resolver.resolve_folder(&index, None).await.unwrap(),
            PathBuf::from("/srv/storage")
        );
    }

    #[tokio::test]
    async fn test_propagate_rewrites_descendants() {
        let (index, resolver) = setup();
        let mut work = add(
            &index,
            &resolver,
            Entry::new_folder("Work", None, PathBuf::from("/srv/storage/Work"), owner()),
        )
        .await;
        let drafts = add(
            &index,
            &resolver,
            Entry::new_folder(
                "Drafts",
                Some(work.id()),
                PathBuf::from("/srv/storage/Work/Drafts"),
                owner(),
            ),
        )
        .await;
        add(
            &index,
            &resolver,
            Entry::new_file(
                "plan.txt",
                Some(drafts.id()),
                PathBuf::from("/srv/storage/Work/Drafts/plan.txt"),
                1,
                owner(),
            ),
        )
        .await;

        let old = work.path().to_path_buf();
        work.rename("Archive");
        work.set_path(PathBuf::from("/srv/storage/Archive"));
        let updated = resolver
            .propagate_path_change(&index, &work, &old, work.path())
            .await
            .unwrap();

        let paths: Vec<_> = updated.iter().map(|e| e.path().to_path_buf()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/srv/storage/Archive/Drafts"),
                PathBuf::from("/srv/storage/Archive/Drafts/plan.txt"),
            ]
        );
    }

    #[tokio::test]
    async fn test_propagate_rebuilds_stale_paths() {
        let (index, resolver) = setup();
        let mut work = add(
            &index,
            &resolver,
            Entry::new_folder("Work", None, PathBuf::from("/srv/storage/Work"), owner()),
        )
        .await;
        let stale = Entry::new_file(
            "notes.md",
            Some(work.id()),
            PathBuf::from("/somewhere/else/notes.md"),
            1,
            owner(),
        );
        index.insert(&stale).await.unwrap();

        let old = work.path().to_path_buf();
        work.set_path(PathBuf::from("/srv/storage/Moved"));
        let updated = resolver
            .propagate_path_change(&index, &work, &old, work.path())
            .await
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].path(), Path::new("/srv/storage/Moved/notes.md"));
    }

    #[tokio::test]
    async fn test_resolve_broken_chain() {
        let repo = MemoryIndexRepository::default();
        let orphan = Entry::new_file(
            "x",
            Some(EntryId::new()),
            PathBuf::from("/srv/storage/gone/x"),
            0,
            owner(),
        );
        repo.force_insert(orphan.clone());
        let index = Index::new(Arc::new(repo));
        let resolver = PathResolver::new("/srv/storage");

        let err = resolver.resolve(&index, &orphan).await.unwrap_err();
        assert!(matches!(err, CoreError::BrokenChain(_)));
    }
}
