//! Disk → index reconciliation
//!
//! [`SyncReconciler`] walks the storage root breadth-first and indexes every
//! disk object that has no entry yet. It never deletes: entries whose backing
//! object vanished are reported as missing, and disk objects that cannot be
//! indexed (kind mismatch, case-only name clash, invalid name) are reported
//! as skipped.
//!
//! ## Guarantees
//!
//! - Parents are indexed before their children, so every inserted entry
//!   references an existing folder.
//! - Running twice in a row inserts nothing the second time.
//! - Runs hold the whole-tree exclusive lock and an internal run mutex, so a
//!   pass never overlaps a tree operation or another pass.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use filedex_audit::AuditLogger;
use filedex_core::domain::{ActorId, Entry, EntryId, EntryKind};
use filedex_core::naming::{name_key, validate_name};
use filedex_core::ports::IFileSystem;
use filedex_core::{CoreError, Index, PathResolver};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::locks::LockManager;
use crate::recycle_bin::RecycleBin;

// ============================================================================
// ReconcileReport
// ============================================================================

/// A disk object the reconciler left alone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPath {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Entries inserted for unindexed disk objects
    pub created_count: usize,
    /// Stored paths of indexed entries with no backing object
    pub missing: Vec<PathBuf>,
    /// Disk objects that could not be indexed
    pub skipped: Vec<SkippedPath>,
    /// Wall-clock duration of the pass in milliseconds
    pub duration_ms: u64,
}

impl ReconcileReport {
    /// Returns true if the pass found nothing to do or report
    pub fn is_clean(&self) -> bool {
        self.created_count == 0 && self.missing.is_empty() && self.skipped.is_empty()
    }

    fn skip(&mut self, path: PathBuf, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(path = %path.display(), reason = %reason, "Skipping disk object");
        self.skipped.push(SkippedPath { path, reason });
    }
}

// ============================================================================
// SyncReconciler
// ============================================================================

/// Heals divergence by indexing what exists on disk
pub struct SyncReconciler {
    index: Index,
    resolver: PathResolver,
    fs: Arc<dyn IFileSystem>,
    bin: RecycleBin,
    audit: Arc<AuditLogger>,
    locks: LockManager,
    run_lock: Mutex<()>,
}

impl SyncReconciler {
    pub fn new(
        index: Index,
        resolver: PathResolver,
        fs: Arc<dyn IFileSystem>,
        bin: RecycleBin,
        audit: Arc<AuditLogger>,
        locks: LockManager,
    ) -> Self {
        Self {
            index,
            resolver,
            fs,
            bin,
            audit,
            locks,
            run_lock: Mutex::new(()),
        }
    }

    /// Runs one full pass
    ///
    /// # Errors
    /// `IoFailure` if the storage root itself cannot be listed, or an index
    /// error while reading the tree. Problems below the root are reported in
    /// the returned [`ReconcileReport`] instead.
    pub async fn reconcile(&self) -> Result<ReconcileReport, CoreError> {
        let _run = self.run_lock.lock().await;
        let _tree = self.locks.lock_tree().await;
        let started = Instant::now();

        info!(root = %self.resolver.root().display(), "Reconciliation started");
        let mut report = ReconcileReport::default();
        let mut queue: VecDeque<(Option<EntryId>, PathBuf)> =
            VecDeque::from([(None, self.resolver.root().to_path_buf())]);

        while let Some((parent_id, dir)) = queue.pop_front() {
            let on_disk = match self.fs.list_children(&dir).await {
                Ok(children) => children,
                Err(e) if parent_id.is_none() => return Err(e.into()),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Cannot list folder during reconciliation");
                    report.skip(dir, format!("cannot list: {e}"));
                    continue;
                }
            };

            let indexed: HashMap<String, Entry> = self
                .index
                .children(parent_id)
                .await?
                .into_iter()
                .map(|e| (e.name_key().to_string(), e))
                .collect();
            let mut present: HashSet<EntryId> = HashSet::new();

            for child in on_disk {
                if child.lossy_name {
                    report.skip(child.path, "name is not valid UTF-8");
                    continue;
                }
                if self.bin.is_reserved(&child.name) {
                    continue;
                }
                if let Err(e) = validate_name(&child.name, self.bin.trash_dir_name()) {
                    report.skip(child.path, e.to_string());
                    continue;
                }

                match indexed.get(&name_key(&child.name)) {
                    Some(entry) if entry.name() != child.name => {
                        report.skip(
                            child.path,
                            format!("name collides with indexed entry {:?}", entry.name()),
                        );
                    }
                    Some(entry) if entry.is_folder() != child.is_dir => {
                        present.insert(entry.id());
                        report.skip(
                            child.path,
                            format!("indexed as a {} but is not one on disk", entry.kind()),
                        );
                    }
                    Some(entry) => {
                        present.insert(entry.id());
                        if entry.is_folder() {
                            queue.push_back((Some(entry.id()), child.path));
                        }
                    }
                    None => {
                        let kind = if child.is_dir {
                            EntryKind::Folder
                        } else {
                            EntryKind::File
                        };
                        let size = if child.is_dir { 0 } else { child.size };
                        let entry = Entry::with_kind(
                            kind,
                            child.name.as_str(),
                            parent_id,
                            child.path.clone(),
                            size,
                            ActorId::system(),
                        );
                        match self.index.insert(&entry).await {
                            Ok(()) => {
                                debug!(path = %entry.path().display(), kind = %kind, "Indexed disk object");
                                self.audit.log_reconciled(&entry).await;
                                report.created_count += 1;
                                if entry.is_folder() {
                                    queue.push_back((Some(entry.id()), child.path));
                                }
                            }
                            Err(e) => {
                                warn!(path = %child.path.display(), error = %e, "Failed to index disk object");
                                report.skip(child.path, e.to_string());
                            }
                        }
                    }
                }
            }

            for entry in indexed.values() {
                if !present.contains(&entry.id()) {
                    report.missing.push(entry.path().to_path_buf());
                }
            }
        }

        report.missing.sort();
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            created = report.created_count,
            missing = report.missing.len(),
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "Reconciliation finished"
        );
        Ok(report)
    }
}
