//! Undo of disk effects when the index commit fails

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use filedex_audit::{AuditLogger, FileEventLog};
use filedex_cache::{DatabasePool, SqliteIndexRepository, SqliteRecycleRepository};
use filedex_core::domain::{Actor, ActorId, Entry, EntryId};
use filedex_core::ports::{DirEntry, FileStat, FsError, IFileSystem, IIndexRepository, RepositoryError};
use filedex_core::{CoreError, Index, PathResolver};
use filedex_sync::{LocalFileSystemAdapter, RecycleBin, ReconcileScheduler, TreeOperations};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

const TRASH: &str = ".filedex-trash";

// ============================================================================
// Failing doubles
// ============================================================================

/// SQLite repository whose writes can be switched to fail
struct FlakyIndex {
    inner: SqliteIndexRepository,
    fail_writes: AtomicBool,
}

impl FlakyIndex {
    fn check(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("database is locked".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IIndexRepository for FlakyIndex {
    async fn insert_entry(&self, entry: &Entry) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.insert_entry(entry).await
    }

    async fn insert_entries(&self, entries: &[Entry]) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.insert_entries(entries).await
    }

    async fn update_entries(&self, entries: &[Entry]) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.update_entries(entries).await
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>, RepositoryError> {
        self.inner.get_entry(id).await
    }

    async fn get_child_by_name(
        &self,
        parent: Option<EntryId>,
        name_key: &str,
    ) -> Result<Option<Entry>, RepositoryError> {
        self.inner.get_child_by_name(parent, name_key).await
    }

    async fn list_children(&self, parent: Option<EntryId>) -> Result<Vec<Entry>, RepositoryError> {
        self.inner.list_children(parent).await
    }

    async fn get_entry_by_path(&self, path: &Path) -> Result<Option<Entry>, RepositoryError> {
        self.inner.get_entry_by_path(path).await
    }

    async fn delete_entries(&self, ids: &[EntryId]) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.delete_entries(ids).await
    }

    async fn search(&self, needle: &str) -> Result<Vec<Entry>, RepositoryError> {
        self.inner.search(needle).await
    }

    async fn list_all(&self) -> Result<Vec<Entry>, RepositoryError> {
        self.inner.list_all().await
    }
}

/// Local adapter whose `remove_tree` can be switched to fail
struct FlakyFs {
    inner: LocalFileSystemAdapter,
    fail_remove: AtomicBool,
}

#[async_trait]
impl IFileSystem for FlakyFs {
    async fn mkdir(&self, path: &Path) -> Result<(), FsError> {
        self.inner.mkdir(path).await
    }

    async fn touch(&self, path: &Path) -> Result<(), FsError> {
        self.inner.touch(path).await
    }

    async fn write_new(
        &self,
        path: &Path,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, FsError> {
        self.inner.write_new(path, source).await
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<u64, FsError> {
        self.inner.copy_file(from, to).await
    }

    async fn copy_tree(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.inner.copy_tree(from, to).await
    }

    async fn move_path(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.inner.move_path(from, to).await
    }

    async fn remove_tree(&self, path: &Path) -> Result<(), FsError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(FsError::Io {
                path: path.to_path_buf(),
                message: "device busy".to_string(),
            });
        }
        self.inner.remove_tree(path).await
    }

    async fn stat(&self, path: &Path) -> Result<FileStat, FsError> {
        self.inner.stat(path).await
    }

    async fn exists(&self, path: &Path) -> Result<bool, FsError> {
        self.inner.exists(path).await
    }

    async fn list_children(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        self.inner.list_children(path).await
    }

    async fn read_into(
        &self,
        path: &Path,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, FsError> {
        self.inner.read_into(path, sink).await
    }
}

// ============================================================================
// Wiring
// ============================================================================

struct FlakyEngine {
    ops: TreeOperations,
    repo: Arc<FlakyIndex>,
    fs: Arc<FlakyFs>,
    root: PathBuf,
    _dir: TempDir,
}

async fn flaky_setup() -> FlakyEngine {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let root = dir.path().join("storage");
    std::fs::create_dir(&root).unwrap();

    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo = Arc::new(FlakyIndex {
        inner: SqliteIndexRepository::new(pool.pool().clone()),
        fail_writes: AtomicBool::new(false),
    });
    let fs = Arc::new(FlakyFs {
        inner: LocalFileSystemAdapter::new(),
        fail_remove: AtomicBool::new(false),
    });
    let bin = RecycleBin::new(Arc::new(SqliteRecycleRepository::new(pool.pool().clone())), TRASH);
    let audit = Arc::new(AuditLogger::new(Arc::new(FileEventLog::new(dir.path().join("logs")))));

    let ops = TreeOperations::new(
        Index::new(repo.clone()),
        PathResolver::new(&root),
        fs.clone(),
        bin,
        audit,
        2,
    );
    FlakyEngine {
        ops,
        repo,
        fs,
        root,
        _dir: dir,
    }
}

fn alice() -> Actor {
    Actor::user(ActorId::new("alice").unwrap())
}

// ============================================================================
// Compensation
// ============================================================================

#[tokio::test]
async fn test_failed_create_folder_removes_directory() {
    let engine = flaky_setup().await;
    engine.repo.fail_writes.store(true, Ordering::SeqCst);

    let err = engine.ops.create_folder(&alice(), "Work", None).await.unwrap_err();
    assert!(matches!(err, CoreError::Index(_)), "got {err:?}");
    assert!(!engine.root.join("Work").exists());
    assert!(engine.ops.index().child_named(None, "Work").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_rename_moves_back() {
    let engine = flaky_setup().await;
    let work = engine.ops.create_folder(&alice(), "Work", None).await.unwrap();
    engine.ops.create_file(&alice(), "plan.txt", Some(work.id())).await.unwrap();
    engine.repo.fail_writes.store(true, Ordering::SeqCst);

    let err = engine.ops.rename(&alice(), work.id(), "Archive").await.unwrap_err();
    assert!(matches!(err, CoreError::Index(_)), "got {err:?}");
    assert!(engine.root.join("Work/plan.txt").is_file());
    assert!(!engine.root.join("Archive").exists());

    let still = engine.ops.index().get(work.id()).await.unwrap();
    assert_eq!(still.name(), "Work");
    assert_eq!(still.path(), engine.root.join("Work"));
}

#[tokio::test]
async fn test_failed_undo_reports_divergence_and_requests_reconcile() {
    let engine = flaky_setup().await;
    engine.repo.fail_writes.store(true, Ordering::SeqCst);
    engine.fs.fail_remove.store(true, Ordering::SeqCst);

    let (mut scheduler, handle) = ReconcileScheduler::new(
        engine.ops.reconciler(),
        None,
        Duration::from_millis(10),
        Duration::from_secs(3600),
        TRASH,
    );
    let ops = engine.ops.with_reconcile_handle(handle);

    let err = ops.create_folder(&alice(), "Work", None).await.unwrap_err();
    match &err {
        CoreError::Divergence { path, .. } => assert_eq!(path, &engine.root.join("Work")),
        other => panic!("expected divergence, got {other:?}"),
    }
    assert!(engine.root.join("Work").is_dir());

    // the queued request is served before the closed channel ends the loop
    engine.repo.fail_writes.store(false, Ordering::SeqCst);
    drop(ops);
    tokio::time::timeout(Duration::from_secs(5), scheduler.run(CancellationToken::new()))
        .await
        .expect("scheduler did not stop");
    assert_eq!(scheduler.runs(), 1);
}
