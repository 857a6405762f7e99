//! AuditLogger - high-level event logging service
//!
//! Wraps an [`IEventSink`] with convenience methods for each kind of tree
//! operation. All recording methods are non-fatal: sink errors are logged
//! via `tracing::warn!` but never propagated, so a full disk in the log
//! directory never fails a rename.

use std::path::Path;
use std::sync::Arc;

use filedex_core::domain::{ActorId, Entry, EntryId};
use filedex_core::ports::IEventSink;

/// High-level logger that records one line per operation in the event sink.
pub struct AuditLogger {
    sink: Arc<dyn IEventSink>,
}

impl AuditLogger {
    /// Creates a new `AuditLogger` backed by the given sink.
    pub fn new(sink: Arc<dyn IEventSink>) -> Self {
        Self { sink }
    }

    /// Append an event line, swallowing errors with a tracing warning.
    async fn record(&self, entry_id: EntryId, actor: &ActorId, message: &str) {
        if let Err(e) = self.sink.append(entry_id, actor, message).await {
            tracing::warn!(entry_id = %entry_id, error = %e, "Failed to record event");
        }
    }

    async fn retire(&self, entry_id: EntryId) {
        if let Err(e) = self.sink.archive(entry_id).await {
            tracing::warn!(entry_id = %entry_id, error = %e, "Failed to archive event log");
        }
    }

    /// Reads the recorded lines for an entry, oldest first.
    ///
    /// Unlike the recording methods this propagates sink errors, since the
    /// caller asked for the log itself.
    pub async fn read(&self, entry_id: EntryId) -> anyhow::Result<Vec<String>> {
        self.sink.read(entry_id).await
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Log creation of an empty file or folder.
    pub async fn log_created(&self, actor: &ActorId, entry: &Entry) {
        let message = format!("created {} {:?}", entry.kind(), entry.name());
        self.record(entry.id(), actor, &message).await;
    }

    /// Log a file upload.
    pub async fn log_uploaded(&self, actor: &ActorId, entry: &Entry) {
        let message = format!("uploaded file {:?} ({} bytes)", entry.name(), entry.size());
        self.record(entry.id(), actor, &message).await;
    }

    /// Log a file download.
    pub async fn log_downloaded(&self, actor: &ActorId, entry: &Entry, bytes: u64) {
        let message = format!("downloaded file {:?} ({bytes} bytes)", entry.name());
        self.record(entry.id(), actor, &message).await;
    }

    // ========================================================================
    // Structural changes
    // ========================================================================

    /// Log a rename.
    pub async fn log_renamed(&self, actor: &ActorId, entry: &Entry, old_name: &str) {
        let message = format!("renamed {old_name:?} to {:?}", entry.name());
        self.record(entry.id(), actor, &message).await;
    }

    /// Log a move to another folder.
    pub async fn log_moved(&self, actor: &ActorId, entry: &Entry, from: &Path) {
        let message = format!(
            "moved from {} to {}",
            from.display(),
            entry.path().display()
        );
        self.record(entry.id(), actor, &message).await;
    }

    /// Log a copy on both the source and the new entry.
    pub async fn log_copied(&self, actor: &ActorId, source: &Entry, copy: &Entry) {
        let message = format!("copied to {}", copy.path().display());
        self.record(source.id(), actor, &message).await;
        let message = format!("copied from {}", source.path().display());
        self.record(copy.id(), actor, &message).await;
    }

    /// Log a soft delete and archive the logs of every removed entry.
    ///
    /// `removed` lists the ids of the whole deleted subtree.
    pub async fn log_deleted(&self, actor: &ActorId, entry: &Entry, removed: &[EntryId]) {
        let message = format!("moved {} {:?} to the recycle bin", entry.kind(), entry.name());
        self.record(entry.id(), actor, &message).await;
        for id in removed {
            self.retire(*id).await;
        }
    }

    /// Log a restore on the freshly created entry.
    pub async fn log_restored(&self, actor: &ActorId, entry: &Entry, original_id: EntryId) {
        let message = format!(
            "restored {:?} from the recycle bin (was {original_id})",
            entry.name()
        );
        self.record(entry.id(), actor, &message).await;
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Log a change of the starred flag.
    pub async fn log_starred(&self, actor: &ActorId, entry: &Entry) {
        let message = if entry.is_starred() {
            "starred"
        } else {
            "unstarred"
        };
        self.record(entry.id(), actor, message).await;
    }

    /// Log an entry discovered on disk by reconciliation.
    pub async fn log_reconciled(&self, entry: &Entry) {
        let message = format!(
            "indexed {} {:?} found on disk",
            entry.kind(),
            entry.name()
        );
        self.record(entry.id(), &ActorId::system(), &message).await;
    }
}
