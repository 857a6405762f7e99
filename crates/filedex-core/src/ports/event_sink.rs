//! Event sink port (driven/secondary port)
//!
//! Receives one human-readable line per operation, keyed by entry id.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because sink failures are never surfaced to
//!   callers of tree operations; the audit wrapper logs and drops them.

use crate::domain::{ActorId, EntryId};

/// Port trait for the per-entry event log
#[async_trait::async_trait]
pub trait IEventSink: Send + Sync {
    /// Appends one event line for `entry_id`
    async fn append(&self, entry_id: EntryId, actor: &ActorId, message: &str) -> anyhow::Result<()>;

    /// Reads the event lines recorded for `entry_id`, oldest first
    ///
    /// Returns an empty list when nothing was recorded.
    async fn read(&self, entry_id: EntryId) -> anyhow::Result<Vec<String>>;

    /// Retires the log of a deleted entry
    async fn archive(&self, entry_id: EntryId) -> anyhow::Result<()>;
}
