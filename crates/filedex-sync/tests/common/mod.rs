//! Shared wiring for the engine integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use filedex_audit::{AuditLogger, FileEventLog};
use filedex_cache::{DatabasePool, SqliteIndexRepository, SqliteRecycleRepository};
use filedex_core::domain::{Actor, ActorId};
use filedex_core::{Index, PathResolver};
use filedex_sync::{LocalFileSystemAdapter, RecycleBin, TreeOperations};
use tempfile::TempDir;

pub const TRASH: &str = ".filedex-trash";

pub struct Engine {
    pub ops: Arc<TreeOperations>,
    pub root: PathBuf,
    _dir: TempDir,
}

pub async fn setup() -> Engine {
    setup_with_workers(4).await
}

pub async fn setup_with_workers(workers: usize) -> Engine {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let root = dir.path().join("storage");
    std::fs::create_dir(&root).unwrap();

    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let index = Index::new(Arc::new(SqliteIndexRepository::new(pool.pool().clone())));
    let bin = RecycleBin::new(Arc::new(SqliteRecycleRepository::new(pool.pool().clone())), TRASH);
    let audit = Arc::new(AuditLogger::new(Arc::new(FileEventLog::new(dir.path().join("logs")))));

    let ops = TreeOperations::new(
        index,
        PathResolver::new(&root),
        Arc::new(LocalFileSystemAdapter::new()),
        bin,
        audit,
        workers,
    );
    Engine {
        ops: Arc::new(ops),
        root,
        _dir: dir,
    }
}

pub fn alice() -> Actor {
    Actor::user(ActorId::new("alice").unwrap())
}

pub fn admin() -> Actor {
    Actor::new(ActorId::new("root").unwrap(), true)
}
