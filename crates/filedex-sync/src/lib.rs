//! FileDex Sync - tree operations and disk reconciliation
//!
//! Provides:
//! - Tree operations that keep the index and the storage directory in step
//! - Hierarchical locking so unrelated subtrees proceed in parallel
//! - A recycle bin backed by per-folder trash containers
//! - Reconciliation of objects created or removed behind FileDex's back
//!
//! ## Modules
//!
//! - [`operations`] - [`TreeOperations`], the single entry point for changes
//! - [`filesystem`] - Local filesystem adapter (exclusive creates, EXDEV fallback)
//! - [`locks`] - Lock plans and the lock manager
//! - [`recycle_bin`] - Recycle records and trash-container naming
//! - [`reconciler`] - Disk-to-index reconciliation pass
//! - [`watcher`] - notify-based change detection with debouncing
//! - [`scheduler`] - Serializes reconciliation passes

pub mod filesystem;
pub mod locks;
pub mod operations;
pub mod reconciler;
pub mod recycle_bin;
pub mod scheduler;
pub mod watcher;

pub use filesystem::LocalFileSystemAdapter;
pub use locks::LockManager;
pub use operations::{DirectoryPage, ItemOutcome, TreeOperations};
pub use reconciler::{ReconcileReport, SkippedPath, SyncReconciler};
pub use recycle_bin::RecycleBin;
pub use scheduler::{ReconcileHandle, ReconcileReason, ReconcileScheduler};
pub use watcher::{ChangeEvent, DebouncedChangeQueue, FileWatcher};
