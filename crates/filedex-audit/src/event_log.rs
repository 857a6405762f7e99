//! FileEventLog - append-only event files, one per entry
//!
//! Each entry id owns `entry_<id>.log` in the configured directory. Every
//! event is one line:
//!
//! ```text
//! [2026-10-16 09:41:07] alice created folder "Work"
//! ```
//!
//! When an entry is deleted its log is renamed to `removed_entry_<id>.log`
//! so the history survives but no longer shadows a live entry.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use filedex_core::domain::{ActorId, EntryId};
use filedex_core::ports::IEventSink;

/// Timestamp layout of every event line
pub const LINE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `IEventSink` backed by plain text files
pub struct FileEventLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileEventLog {
    /// Creates a log writing into `dir`; the directory is created lazily
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the log directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the live log for `entry_id`
    pub fn log_path(&self, entry_id: EntryId) -> PathBuf {
        self.dir.join(format!("entry_{entry_id}.log"))
    }

    /// Path of the archived log for `entry_id`
    pub fn archived_path(&self, entry_id: EntryId) -> PathBuf {
        self.dir.join(format!("removed_entry_{entry_id}.log"))
    }

    /// Formats one event line, newline included
    pub fn format_line(actor: &ActorId, message: &str) -> String {
        let message = message.replace(['\n', '\r'], " ");
        format!(
            "[{}] {} {}\n",
            Utc::now().format(LINE_TIME_FORMAT),
            actor,
            message
        )
    }
}

#[async_trait::async_trait]
impl IEventSink for FileEventLog {
    async fn append(&self, entry_id: EntryId, actor: &ActorId, message: &str) -> anyhow::Result<()> {
        let line = Self::format_line(actor, message);
        let path = self.log_path(entry_id);

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::trace!(entry_id = %entry_id, path = %path.display(), "Appended event");
        Ok(())
    }

    async fn read(&self, entry_id: EntryId) -> anyhow::Result<Vec<String>> {
        match fs::read_to_string(self.log_path(entry_id)).await {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn archive(&self, entry_id: EntryId) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        match fs::rename(self.log_path(entry_id), self.archived_path(entry_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
