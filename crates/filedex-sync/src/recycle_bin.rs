//! Recycle bin: soft-deleted records and their trash containers
//!
//! Soft-deleted data never leaves its original parent directory: it moves
//! into that directory's trash container, a reserved child directory
//! (`.filedex-trash` by default). The container name can never be claimed
//! by an entry and reconciliation never descends into it.
//!
//! [`RecycleBin`] owns the record set behind [`IRecycleRepository`] and the
//! container naming rules. The moves themselves are driven by
//! `TreeOperations`.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filedex_core::domain::{EntryId, RecycleId, RecycleItem};
use filedex_core::naming::name_key;
use filedex_core::ports::{FsError, IFileSystem, IRecycleRepository};
use filedex_core::CoreError;
use tracing::debug;

/// Record set and trash-container conventions
#[derive(Clone)]
pub struct RecycleBin {
    repo: Arc<dyn IRecycleRepository>,
    trash_dir_name: String,
}

impl RecycleBin {
    pub fn new(repo: Arc<dyn IRecycleRepository>, trash_dir_name: impl Into<String>) -> Self {
        Self {
            repo,
            trash_dir_name: trash_dir_name.into(),
        }
    }

    /// Name of the per-folder trash container
    pub fn trash_dir_name(&self) -> &str {
        &self.trash_dir_name
    }

    /// Returns true if `name` is the trash container name (any case)
    pub fn is_reserved(&self, name: &str) -> bool {
        name_key(name) == name_key(&self.trash_dir_name)
    }

    /// Trash container of the directory `dir`
    pub fn container_for(&self, dir: &Path) -> PathBuf {
        dir.join(&self.trash_dir_name)
    }

    /// Directory whose trash container holds `path`
    ///
    /// That is the directory before the first container component below
    /// `root`; `None` when `path` is not inside a container.
    pub fn owner_dir(&self, root: &Path, path: &Path) -> Option<PathBuf> {
        let rest = path.strip_prefix(root).ok()?;
        let mut dir = root.to_path_buf();
        for component in rest.components() {
            if self.is_reserved(&component.as_os_str().to_string_lossy()) {
                return Some(dir);
            }
            dir.push(component);
        }
        None
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Top-level items in deletion order
    pub async fn list(&self) -> Result<Vec<RecycleItem>, CoreError> {
        Ok(self.repo.list_top_level().await?)
    }

    /// Every item, nested ones included, in deletion order
    pub async fn list_all(&self) -> Result<Vec<RecycleItem>, CoreError> {
        Ok(self.repo.list_all().await?)
    }

    pub async fn find(&self, id: RecycleId) -> Result<Option<RecycleItem>, CoreError> {
        Ok(self.repo.get_item(id).await?)
    }

    /// Returns the item with `id`, or `NotFound`
    pub async fn get(&self, id: RecycleId) -> Result<RecycleItem, CoreError> {
        self.find(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("recycle bin item {id}")))
    }

    /// Direct nested items of `id`
    pub async fn children(&self, id: RecycleId) -> Result<Vec<RecycleItem>, CoreError> {
        Ok(self.repo.list_children(id).await?)
    }

    /// `item` and all items nested below it, parents first
    pub async fn subtree(&self, item: &RecycleItem) -> Result<Vec<RecycleItem>, CoreError> {
        let mut out = vec![item.clone()];
        let mut queue = VecDeque::from([item.id()]);
        while let Some(id) = queue.pop_front() {
            for child in self.children(id).await? {
                queue.push_back(child.id());
                out.push(child);
            }
        }
        Ok(out)
    }

    /// Walks `parent_item` links up to the top-level item containing `id`
    pub async fn top_level_of(&self, id: RecycleId) -> Result<RecycleItem, CoreError> {
        let mut item = self.get(id).await?;
        let mut visited = HashSet::from([item.id()]);
        while let Some(parent) = item.parent_item() {
            match self.find(parent).await? {
                Some(parent_item) if visited.insert(parent_item.id()) => item = parent_item,
                _ => break,
            }
        }
        Ok(item)
    }

    /// Stores the records of one soft delete
    pub async fn insert(&self, items: &[RecycleItem]) -> Result<(), CoreError> {
        Ok(self.repo.insert_items(items).await?)
    }

    /// Deletes `item` and every nested record, returning the removed ids
    pub async fn remove(&self, item: &RecycleItem) -> Result<Vec<RecycleId>, CoreError> {
        let mut ids: Vec<RecycleId> = self.subtree(item).await?.iter().map(RecycleItem::id).collect();
        ids.reverse();
        self.repo.delete_items(&ids).await?;
        debug!(item_id = %item.id(), count = ids.len(), "Removed recycle records");
        Ok(ids)
    }

    /// Rewrites the relocated paths of records stored below `old_prefix`
    ///
    /// Trash containers travel with their folder, so moving a folder on
    /// disk moves the data of earlier deletions inside it as well. Returns
    /// how many records changed.
    pub async fn repoint(&self, old_prefix: &Path, new_prefix: &Path) -> Result<usize, CoreError> {
        let updates: Vec<(RecycleId, PathBuf)> = self
            .list_all()
            .await?
            .iter()
            .filter_map(|item| {
                let rest = item.relocated_path().strip_prefix(old_prefix).ok()?;
                Some((item.id(), new_prefix.join(rest)))
            })
            .collect();
        if !updates.is_empty() {
            self.repo.update_relocated_paths(&updates).await?;
            debug!(
                from = %old_prefix.display(),
                to = %new_prefix.display(),
                count = updates.len(),
                "Repointed recycle records"
            );
        }
        Ok(updates.len())
    }

    /// Top-level items outside `exclude` whose data lies below `path`
    ///
    /// Only the outermost are returned; anything stored inside them moves
    /// with them.
    pub async fn stashed_under(
        &self,
        path: &Path,
        exclude: &HashSet<RecycleId>,
    ) -> Result<Vec<RecycleItem>, CoreError> {
        let mut found: Vec<RecycleItem> = self
            .list()
            .await?
            .into_iter()
            .filter(|item| {
                !exclude.contains(&item.id())
                    && item.relocated_path() != path
                    && item.relocated_path().starts_with(path)
            })
            .collect();
        found.sort_by_key(|item| item.relocated_path().components().count());

        let mut outermost: Vec<RecycleItem> = Vec::new();
        for item in found {
            if !outermost
                .iter()
                .any(|o| item.relocated_path().starts_with(o.relocated_path()))
            {
                outermost.push(item);
            }
        }
        Ok(outermost)
    }

    // ========================================================================
    // Trash containers
    // ========================================================================

    /// Picks where a node called `name` from `dir` should be relocated
    ///
    /// Creates the container when missing. The target is
    /// `<container>/<name>`, or `<container>/<entry id>_<name>` when an
    /// earlier deletion already occupies the plain name.
    pub async fn relocation_target(
        &self,
        fs: &dyn IFileSystem,
        dir: &Path,
        name: &str,
        entry_id: EntryId,
    ) -> Result<PathBuf, CoreError> {
        let container = self.container_for(dir);
        match fs.mkdir(&container).await {
            Ok(()) => debug!(container = %container.display(), "Created trash container"),
            Err(FsError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let plain = container.join(name);
        if !fs.exists(&plain).await? {
            return Ok(plain);
        }
        let prefixed = container.join(format!("{entry_id}_{name}"));
        if fs.exists(&prefixed).await? {
            return Err(CoreError::Conflict(format!(
                "{} already exists in the recycle bin",
                prefixed.display()
            )));
        }
        Ok(prefixed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use filedex_cache::{DatabasePool, SqliteRecycleRepository};
    use filedex_core::domain::{ActorId, Entry};
    use tempfile::TempDir;

    use super::*;
    use crate::filesystem::LocalFileSystemAdapter;

    async fn bin() -> RecycleBin {
        let pool = DatabasePool::in_memory().await.unwrap();
        RecycleBin::new(
            Arc::new(SqliteRecycleRepository::new(pool.pool().clone())),
            ".filedex-trash",
        )
    }

    fn alice() -> ActorId {
        ActorId::new("alice").unwrap()
    }

    #[tokio::test]
    async fn test_reserved_name_is_case_insensitive() {
        let bin = bin().await;
        assert!(bin.is_reserved(".filedex-trash"));
        assert!(bin.is_reserved(".FileDex-Trash"));
        assert!(!bin.is_reserved("trash"));
    }

    #[tokio::test]
    async fn test_relocation_target_falls_back_to_id_prefix() {
        let bin = bin().await;
        let fs = LocalFileSystemAdapter::new();
        let dir = TempDir::new().unwrap();
        let id = EntryId::new();

        let first = bin
            .relocation_target(&fs, dir.path(), "plan.txt", id)
            .await
            .unwrap();
        assert_eq!(first, dir.path().join(".filedex-trash/plan.txt"));
        assert!(dir.path().join(".filedex-trash").is_dir());

        std::fs::write(&first, b"old").unwrap();
        let second = bin
            .relocation_target(&fs, dir.path(), "plan.txt", id)
            .await
            .unwrap();
        assert_eq!(
            second,
            dir.path().join(format!(".filedex-trash/{id}_plan.txt"))
        );
    }

    #[tokio::test]
    async fn test_subtree_remove_and_top_level() {
        let bin = bin().await;
        let work = Entry::new_folder("Work", None, PathBuf::from("/srv/Work"), alice());
        let drafts = Entry::new_folder("Drafts", Some(work.id()), work.path().join("Drafts"), alice());
        let plan = Entry::new_file("plan.txt", Some(drafts.id()), drafts.path().join("plan.txt"), 3, alice());

        let now = Utc::now();
        let top = RecycleItem::from_entry(RecycleId::new(), &work, alice(), now, PathBuf::from("/t/Work"), None);
        let mid = RecycleItem::from_entry(
            RecycleId::new(),
            &drafts,
            alice(),
            now,
            PathBuf::from("/t/Work/Drafts"),
            Some(top.id()),
        );
        let leaf = RecycleItem::from_entry(
            RecycleId::new(),
            &plan,
            alice(),
            now,
            PathBuf::from("/t/Work/Drafts/plan.txt"),
            Some(mid.id()),
        );
        bin.insert(&[leaf.clone(), mid.clone(), top.clone()]).await.unwrap();

        assert_eq!(bin.list().await.unwrap(), vec![top.clone()]);
        assert_eq!(bin.top_level_of(leaf.id()).await.unwrap().id(), top.id());

        let ids: Vec<_> = bin.subtree(&top).await.unwrap().iter().map(RecycleItem::id).collect();
        assert_eq!(ids, vec![top.id(), mid.id(), leaf.id()]);

        let removed = bin.remove(&top).await.unwrap();
        assert_eq!(removed, vec![leaf.id(), mid.id(), top.id()]);
        assert!(bin.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repoint_rewrites_only_records_below_prefix() {
        let bin = bin().await;
        let plan = Entry::new_file("plan.txt", None, PathBuf::from("/srv/Work/plan.txt"), 1, alice());
        let other = Entry::new_file("other.txt", None, PathBuf::from("/srv/other.txt"), 1, alice());
        let now = Utc::now();
        let inside = RecycleItem::from_entry(
            RecycleId::new(),
            &plan,
            alice(),
            now,
            PathBuf::from("/srv/Work/.filedex-trash/plan.txt"),
            None,
        );
        let outside = RecycleItem::from_entry(
            RecycleId::new(),
            &other,
            alice(),
            now,
            PathBuf::from("/srv/.filedex-trash/other.txt"),
            None,
        );
        bin.insert(&[inside.clone(), outside.clone()]).await.unwrap();

        let count = bin
            .repoint(Path::new("/srv/Work"), Path::new("/srv/Archive"))
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            bin.get(inside.id()).await.unwrap().relocated_path(),
            Path::new("/srv/Archive/.filedex-trash/plan.txt")
        );
        assert_eq!(bin.get(outside.id()).await.unwrap(), outside);
    }

    #[tokio::test]
    async fn test_owner_dir_stops_at_first_container() {
        let bin = bin().await;
        let root = Path::new("/srv");
        assert_eq!(
            bin.owner_dir(root, Path::new("/srv/.filedex-trash/Work/.filedex-trash/Drafts")),
            Some(PathBuf::from("/srv"))
        );
        assert_eq!(
            bin.owner_dir(root, Path::new("/srv/Work/.FileDex-Trash/plan.txt")),
            Some(PathBuf::from("/srv/Work"))
        );
        assert_eq!(bin.owner_dir(root, Path::new("/srv/Work/plan.txt")), None);
        assert_eq!(bin.owner_dir(root, Path::new("/elsewhere/.filedex-trash/a")), None);
    }

    #[tokio::test]
    async fn test_stashed_under_returns_outermost_foreign_items() {
        let bin = bin().await;
        let now = Utc::now();
        let item = |name: &str, relocated: &str| {
            let entry = Entry::new_file(name, None, PathBuf::from("/srv").join(name), 1, alice());
            RecycleItem::from_entry(RecycleId::new(), &entry, alice(), now, PathBuf::from(relocated), None)
        };
        let work = item("Work", "/srv/.filedex-trash/Work");
        let drafts = item("Drafts", "/srv/.filedex-trash/Work/.filedex-trash/Drafts");
        let deeper = item("old.txt", "/srv/.filedex-trash/Work/.filedex-trash/Drafts/.filedex-trash/old.txt");
        let beside = item("Workbook", "/srv/.filedex-trash/Workbook");
        bin.insert(&[work.clone(), drafts.clone(), deeper, beside]).await.unwrap();

        let exclude: HashSet<RecycleId> = [work.id()].into_iter().collect();
        let stashed = bin.stashed_under(work.relocated_path(), &exclude).await.unwrap();
        assert_eq!(stashed, vec![drafts]);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let bin = bin().await;
        let err = bin.get(RecycleId::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
