//! Tree operations - the single entry point for every change to the tree
//!
//! [`TreeOperations`] composes the [`Index`], the filesystem port, the
//! [`RecycleBin`] and the [`AuditLogger`] under the lock discipline of
//! [`LockManager`]. Each mutating call follows the same steps:
//!
//! 1. take a worker permit (bounds concurrent disk work)
//! 2. take the lock plan for what it touches
//! 3. perform the disk effect
//! 4. commit the index effect in one transaction
//! 5. record the event
//!
//! ## Dual writes
//!
//! Disk and index share no transaction. When the index commit fails after
//! the disk effect succeeded, the disk effect is undone. If undoing fails
//! too, the call returns [`CoreError::Divergence`] and a reconciliation pass
//! is requested through the [`ReconcileHandle`].
//!
//! The operations are split by concern:
//! - `create`: folders, empty files, uploads
//! - `relocate`: rename and move
//! - `copy`: recursive copies with cancellation
//! - `trash`: soft delete, restore, purge

mod copy;
mod create;
mod relocate;
mod trash;

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use filedex_audit::AuditLogger;
use filedex_core::domain::{Actor, Entry, EntryId, EntryKind, EntryProperties};
use filedex_core::naming::{first_free, name_key};
use filedex_core::ports::{DirEntry, FsError, IFileSystem};
use filedex_core::{CoreError, Index, PathResolver};
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};

use crate::locks::{LockManager, LockRequest, LockSet};
use crate::reconciler::{ReconcileReport, SyncReconciler};
use crate::recycle_bin::RecycleBin;
use crate::scheduler::{ReconcileHandle, ReconcileReason};

// ============================================================================
// Result types
// ============================================================================

/// Per-id result of a batch operation
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome<T> {
    /// Id the caller asked for
    pub id: EntryId,
    pub result: Result<T, CoreError>,
}

impl<T> ItemOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// One page of a raw directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryPage {
    pub items: Vec<DirEntry>,
    pub total: usize,
    /// 1-based page number
    pub page: usize,
    pub limit: usize,
    pub pages: usize,
}

// ============================================================================
// TreeOperations
// ============================================================================

/// Orchestrates every tree operation
pub struct TreeOperations {
    index: Index,
    resolver: PathResolver,
    fs: Arc<dyn IFileSystem>,
    bin: RecycleBin,
    audit: Arc<AuditLogger>,
    locks: LockManager,
    workers: Semaphore,
    reconciler: Arc<SyncReconciler>,
    reconcile_handle: Option<ReconcileHandle>,
}

impl TreeOperations {
    /// Wires the engine together
    ///
    /// `max_concurrent` bounds how many mutating operations do disk work at
    /// the same time.
    pub fn new(
        index: Index,
        resolver: PathResolver,
        fs: Arc<dyn IFileSystem>,
        bin: RecycleBin,
        audit: Arc<AuditLogger>,
        max_concurrent: usize,
    ) -> Self {
        let locks = LockManager::new();
        let reconciler = Arc::new(SyncReconciler::new(
            index.clone(),
            resolver.clone(),
            Arc::clone(&fs),
            bin.clone(),
            Arc::clone(&audit),
            locks.clone(),
        ));
        Self {
            index,
            resolver,
            fs,
            bin,
            audit,
            locks,
            workers: Semaphore::new(max_concurrent.max(1)),
            reconciler,
            reconcile_handle: None,
        }
    }

    /// Routes divergence reports to a running scheduler
    pub fn with_reconcile_handle(mut self, handle: ReconcileHandle) -> Self {
        self.reconcile_handle = Some(handle);
        self
    }

    /// The reconciler sharing this engine's locks, for the scheduler
    pub fn reconciler(&self) -> Arc<SyncReconciler> {
        Arc::clone(&self.reconciler)
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn recycle_bin(&self) -> &RecycleBin {
        &self.bin
    }

    pub fn storage_root(&self) -> &Path {
        self.resolver.root()
    }

    // ========================================================================
    // Shared plumbing
    // ========================================================================

    async fn permit(&self) -> Result<SemaphorePermit<'_>, CoreError> {
        self.workers
            .acquire()
            .await
            .map_err(|_| CoreError::io(self.resolver.root(), "worker pool is shut down"))
    }

    async fn lock(&self, request: LockRequest) -> Result<LockSet, CoreError> {
        self.locks.lock(&self.index, &request).await
    }

    /// Directory backing `folder` (the storage root for `None`)
    fn dir_of(&self, folder: Option<&Entry>) -> PathBuf {
        match folder {
            Some(folder) => folder.path().to_path_buf(),
            None => self.resolver.root().to_path_buf(),
        }
    }

    /// First name based on `name` that neither the index nor the disk holds
    /// in the given folder
    async fn free_name(
        &self,
        parent: Option<EntryId>,
        dir: &Path,
        name: &str,
        kind: EntryKind,
    ) -> Result<String, CoreError> {
        let mut taken: HashSet<String> = self
            .index
            .children(parent)
            .await?
            .iter()
            .map(|e| e.name_key().to_string())
            .collect();
        for child in self.fs.list_children(dir).await? {
            taken.insert(name_key(&child.name));
        }
        taken.insert(name_key(self.bin.trash_dir_name()));

        first_free(name, kind, &taken)
            .ok_or_else(|| CoreError::Conflict(format!("no free name for {name:?} in {}", dir.display())))
    }

    /// Reports a disk/index disagreement that could not be undone
    fn diverged(&self, path: &Path, message: impl Into<String>) -> CoreError {
        let message = message.into();
        error!(path = %path.display(), message = %message, "Index and disk diverged");
        match &self.reconcile_handle {
            Some(handle) => {
                handle.request(ReconcileReason::Divergence(path.to_path_buf()));
            }
            None => warn!("No reconcile scheduler attached; run a reconciliation pass"),
        }
        CoreError::Divergence {
            path: path.to_path_buf(),
            message,
        }
    }

    /// Undoes a disk effect after a failed index commit
    ///
    /// Returns `cause` when the undo worked, or a divergence error.
    async fn compensate<F>(&self, cause: CoreError, path: &Path, undo: F) -> CoreError
    where
        F: std::future::Future<Output = Result<(), FsError>>,
    {
        warn!(path = %path.display(), error = %cause, "Index commit failed, undoing disk change");
        match undo.await {
            Ok(()) => cause,
            Err(undo_err) => self.diverged(
                path,
                format!("index commit failed ({cause}) and the disk change could not be undone ({undo_err})"),
            ),
        }
    }

    /// Follows a directory move with the recycle records stored below it
    async fn repoint_bin(&self, old: &Path, new: &Path) {
        if let Err(e) = self.bin.repoint(old, new).await {
            warn!(
                from = %old.display(),
                to = %new.display(),
                error = %e,
                "Recycle records below a moved folder keep their old paths"
            );
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns one entry
    pub async fn get(&self, id: EntryId) -> Result<Entry, CoreError> {
        let _locks = self.lock(LockRequest::new().read_parents_of(id)).await?;
        self.index.get(id).await
    }

    /// Children of `parent` (root level for `None`), ordered by name
    pub async fn list_children(&self, parent: Option<EntryId>) -> Result<Vec<Entry>, CoreError> {
        let _locks = self.lock(LockRequest::new().read_folder(parent)).await?;
        self.index.require_folder(parent).await?;
        self.index.children(parent).await
    }

    /// Case-insensitive substring search over names, starred first
    pub async fn search(&self, needle: &str) -> Result<Vec<Entry>, CoreError> {
        let _locks = self.lock(LockRequest::new()).await?;
        self.index.search(needle).await
    }

    /// Disk metadata of an entry
    ///
    /// Files report their on-disk size; folders report the summed index
    /// size of all descendant files.
    pub async fn properties(&self, id: EntryId) -> Result<EntryProperties, CoreError> {
        let _locks = self.lock(LockRequest::new().read_folder(Some(id))).await?;
        let entry = self.index.get(id).await?;
        let stat = self.fs.stat(entry.path()).await?;
        let size = if entry.is_folder() {
            self.index.folder_size(&entry).await?
        } else {
            stat.size
        };

        Ok(EntryProperties {
            id: entry.id(),
            name: entry.name().to_string(),
            kind: entry.kind(),
            path: entry.path().to_path_buf(),
            size,
            created_at: stat.created.unwrap_or_else(|| entry.created_at()),
            modified_at: stat.modified.unwrap_or_else(|| entry.modified_at()),
            accessed_at: stat.accessed,
            readonly: stat.readonly,
            mode: stat.mode,
            starred: entry.is_starred(),
            owner_id: entry.owner_id().clone(),
        })
    }

    /// Raw, paginated listing of a directory below the storage root
    ///
    /// `relative` is resolved against the storage root; the empty path is
    /// the root itself. Trash containers are hidden.
    pub async fn list_directory(
        &self,
        relative: &Path,
        page: usize,
        limit: usize,
    ) -> Result<DirectoryPage, CoreError> {
        if page == 0 || limit == 0 {
            return Err(CoreError::InvalidOperation(
                "page and limit must be at least 1".to_string(),
            ));
        }
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(CoreError::InvalidOperation(format!(
                "{} is not a path below the storage root",
                relative.display()
            )));
        }

        let _locks = self.lock(LockRequest::new()).await?;
        let dir = self.resolver.root().join(relative);
        let items: Vec<DirEntry> = self
            .fs
            .list_children(&dir)
            .await?
            .into_iter()
            .filter(|c| !self.bin.is_reserved(&c.name))
            .collect();

        let total = items.len();
        let items = items
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        Ok(DirectoryPage {
            items,
            total,
            page,
            limit,
            pages: total.div_ceil(limit),
        })
    }

    /// Event log lines recorded for an entry, oldest first
    pub async fn entry_log(&self, id: EntryId) -> Result<Vec<String>, CoreError> {
        self.audit
            .read(id)
            .await
            .map_err(|e| CoreError::Index(format!("cannot read event log of {id}: {e}")))
    }

    /// Streams a file's content into `sink`, returning the byte count
    pub async fn download(
        &self,
        actor: &Actor,
        id: EntryId,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, CoreError> {
        let _locks = self.lock(LockRequest::new().read_folder(Some(id))).await?;
        let entry = self.index.get(id).await?;
        if entry.is_folder() {
            return Err(CoreError::InvalidOperation(format!(
                "{} is a folder and cannot be downloaded",
                entry.name()
            )));
        }
        let bytes = self.fs.read_into(entry.path(), sink).await?;
        self.audit.log_downloaded(actor.id(), &entry, bytes).await;
        debug!(entry_id = %id, bytes, "Download complete");
        Ok(bytes)
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Flips the starred flag
    pub async fn star(&self, actor: &Actor, id: EntryId) -> Result<Entry, CoreError> {
        let _locks = self
            .lock(LockRequest::new().read_parents_of(id).write_node(Some(id)))
            .await?;
        let current = self.index.get(id).await?;
        let entry = self.index.set_starred(id, !current.is_starred()).await?;
        self.audit.log_starred(actor.id(), &entry).await;
        Ok(entry)
    }

    /// Sets the starred flag; a no-op when it already has that value
    pub async fn set_starred(&self, actor: &Actor, id: EntryId, starred: bool) -> Result<Entry, CoreError> {
        let _locks = self
            .lock(LockRequest::new().read_parents_of(id).write_node(Some(id)))
            .await?;
        let current = self.index.get(id).await?;
        if current.is_starred() == starred {
            return Ok(current);
        }
        let entry = self.index.set_starred(id, starred).await?;
        self.audit.log_starred(actor.id(), &entry).await;
        Ok(entry)
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Runs a reconciliation pass now
    pub async fn reconcile(&self, actor: &Actor) -> Result<ReconcileReport, CoreError> {
        info!(actor = %actor.id(), "Reconciliation requested");
        self.reconciler.reconcile().await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{alice, harness};
    use super::*;

    #[tokio::test]
    async fn test_list_children_of_file_is_invalid() {
        let h = harness().await;
        let file = h.ops.create_file(&alice(), "a.txt", None).await.unwrap();
        let err = h.ops.list_children(Some(file.id())).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_star_toggles_and_logs() {
        let h = harness().await;
        let file = h.ops.create_file(&alice(), "a.txt", None).await.unwrap();

        assert!(h.ops.star(&alice(), file.id()).await.unwrap().is_starred());
        assert!(!h.ops.star(&alice(), file.id()).await.unwrap().is_starred());
        assert!(h.ops.set_starred(&alice(), file.id(), true).await.unwrap().is_starred());
        assert!(h.ops.set_starred(&alice(), file.id(), true).await.unwrap().is_starred());

        let log = h.ops.entry_log(file.id()).await.unwrap();
        assert_eq!(log.len(), 4);
        assert!(log[1].ends_with("alice starred"));
        assert!(log[2].ends_with("alice unstarred"));
    }

    #[tokio::test]
    async fn test_search_puts_starred_first() {
        let h = harness().await;
        h.ops.create_file(&alice(), "a_plan.txt", None).await.unwrap();
        let b = h.ops.create_file(&alice(), "b_PLAN.txt", None).await.unwrap();
        h.ops.create_file(&alice(), "notes.md", None).await.unwrap();
        h.ops.star(&alice(), b.id()).await.unwrap();

        let names: Vec<_> = h
            .ops
            .search("Plan")
            .await
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["b_PLAN.txt", "a_plan.txt"]);
    }

    #[tokio::test]
    async fn test_properties_of_folder_sums_files() {
        let h = harness().await;
        let work = h.ops.create_folder(&alice(), "Work", None).await.unwrap();
        let mut five: &[u8] = b"12345";
        h.ops.upload(&alice(), Some(work.id()), "a.bin", &mut five).await.unwrap();
        let mut three: &[u8] = b"abc";
        h.ops.upload(&alice(), Some(work.id()), "b.bin", &mut three).await.unwrap();

        let props = h.ops.properties(work.id()).await.unwrap();
        assert_eq!(props.size, 8);
        assert_eq!(props.kind, EntryKind::Folder);
        assert!(props.accessed_at.is_some());
        assert_eq!(props.permissions().len(), 9);
    }

    #[tokio::test]
    async fn test_download_streams_and_logs() {
        let h = harness().await;
        let mut source: &[u8] = b"hello";
        let file = h.ops.upload(&alice(), None, "hello.txt", &mut source).await.unwrap();

        let mut sink = Vec::new();
        let n = h.ops.download(&alice(), file.id(), &mut sink).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(sink, b"hello");
        assert!(h.ops.entry_log(file.id()).await.unwrap()[1].contains("downloaded"));

        let folder = h.ops.create_folder(&alice(), "Work", None).await.unwrap();
        let err = h.ops.download(&alice(), folder.id(), &mut sink).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_list_directory_paginates_and_hides_trash() {
        let h = harness().await;
        for name in ["a", "b", "c"] {
            h.ops.create_file(&alice(), name, None).await.unwrap();
        }
        std::fs::create_dir(h.root.join(".filedex-trash")).unwrap();

        let first = h.ops.list_directory(Path::new(""), 1, 2).await.unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.pages, 2);
        assert_eq!(first.items.len(), 2);

        let second = h.ops.list_directory(Path::new(""), 2, 2).await.unwrap();
        assert_eq!(second.items[0].name, "c");

        let err = h.ops.list_directory(Path::new("../etc"), 1, 10).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation(_)));
    }
}
