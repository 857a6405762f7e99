//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`IFileSystem`] using `tokio::fs` for single-object calls and
//! `spawn_blocking` + `walkdir` for whole-tree copies.
//!
//! ## Design Decisions
//!
//! - **Exclusive creation**: files are opened with `create_new`, directories
//!   with a non-recursive `create_dir`, so an occupied destination always
//!   surfaces as [`FsError::AlreadyExists`].
//! - **No partial objects**: a failed stream write or copy removes what it
//!   created before returning.
//! - **Cross-device moves**: `rename` failing with `EXDEV` falls back to
//!   copy + remove. If the source cannot be removed afterwards the move is
//!   reported as an I/O failure ("partially moved"); both copies remain.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use filedex_core::ports::{DirEntry, FileStat, FsError, IFileSystem};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument, warn};

/// `rename(2)` error for moves across mount points (Linux and macOS)
const EXDEV: i32 = 18;

// ============================================================================
// LocalFileSystemAdapter struct
// ============================================================================

/// Adapter that bridges the [`IFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because every operation receives absolute
/// paths. The storage root lives at a higher layer.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn ensure_absent(path: &Path) -> Result<(), FsError> {
        match fs::symlink_metadata(path).await {
            Ok(_) => Err(FsError::AlreadyExists(path.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FsError::from_io(path, e)),
        }
    }

    async fn copy_any(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let meta = fs::symlink_metadata(from)
            .await
            .map_err(|e| FsError::from_io(from, e))?;
        if meta.is_dir() {
            self.copy_tree(from, to).await
        } else {
            self.copy_file(from, to).await.map(|_| ())
        }
    }
}

fn to_utc(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

/// Copies a directory tree; runs on a blocking thread
fn copy_tree_blocking(from: &Path, to: &Path) -> Result<(), FsError> {
    std::fs::create_dir(to).map_err(|e| FsError::from_io(to, e))?;

    for item in walkdir::WalkDir::new(from).min_depth(1).follow_links(false) {
        let item = item.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            FsError::io(&path, e.to_string())
        })?;
        let rel = item
            .path()
            .strip_prefix(from)
            .map_err(|e| FsError::io(item.path(), e.to_string()))?;
        let target = to.join(rel);
        let kind = item.file_type();

        if kind.is_dir() {
            std::fs::create_dir(&target).map_err(|e| FsError::from_io(&target, e))?;
        } else if kind.is_file() {
            std::fs::copy(item.path(), &target).map_err(|e| FsError::from_io(item.path(), e))?;
        } else {
            debug!(path = %item.path().display(), "Skipping special file during tree copy");
        }
    }
    Ok(())
}

// ============================================================================
// IFileSystem implementation
// ============================================================================

#[async_trait::async_trait]
impl IFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn mkdir(&self, path: &Path) -> Result<(), FsError> {
        fs::create_dir(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        debug!("directory created");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn touch(&self, path: &Path) -> Result<(), FsError> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        debug!("empty file created");
        Ok(())
    }

    #[instrument(skip(self, source), fields(path = %path.display()))]
    async fn write_new(
        &self,
        path: &Path,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, FsError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        let written = async {
            let n = tokio::io::copy(source, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(n)
        }
        .await;

        match written {
            Ok(n) => {
                debug!(bytes = n, "stream written");
                Ok(n)
            }
            Err(e) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(path).await {
                    warn!(error = %cleanup, "Failed to remove partial upload");
                }
                Err(FsError::io(path, format!("stream failed: {e}")))
            }
        }
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn copy_file(&self, from: &Path, to: &Path) -> Result<u64, FsError> {
        let mut source = fs::File::open(from)
            .await
            .map_err(|e| FsError::from_io(from, e))?;
        let mut target = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(to)
            .await
            .map_err(|e| FsError::from_io(to, e))?;

        let copied = async {
            let n = tokio::io::copy(&mut source, &mut target).await?;
            target.flush().await?;
            Ok::<u64, std::io::Error>(n)
        }
        .await;

        match copied {
            Ok(n) => {
                debug!(bytes = n, "file copied");
                Ok(n)
            }
            Err(e) => {
                drop(target);
                if let Err(cleanup) = fs::remove_file(to).await {
                    warn!(error = %cleanup, "Failed to remove partial copy");
                }
                Err(FsError::from_io(to, e))
            }
        }
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn copy_tree(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let (src, dst) = (from.to_path_buf(), to.to_path_buf());
        let result = tokio::task::spawn_blocking(move || {
            let result = copy_tree_blocking(&src, &dst);
            if result.is_err() && dst.exists() {
                if let Err(cleanup) = std::fs::remove_dir_all(&dst) {
                    warn!(error = %cleanup, "Failed to remove partial tree copy");
                }
            }
            result
        })
        .await
        .map_err(|e| FsError::io(to, format!("copy task failed: {e}")))?;

        if result.is_ok() {
            debug!("tree copied");
        }
        result
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn move_path(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        Self::ensure_absent(to).await?;

        match fs::rename(from, to).await {
            Ok(()) => {
                debug!("renamed in place");
                Ok(())
            }
            Err(e) if e.raw_os_error() == Some(EXDEV) => {
                debug!("cross-device move, falling back to copy + remove");
                self.copy_any(from, to).await?;
                self.remove_tree(from).await.map_err(|e| {
                    FsError::io(from, format!("partially moved to {}: {e}", to.display()))
                })
            }
            Err(e) => Err(FsError::from_io(from, e)),
        }
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn remove_tree(&self, path: &Path) -> Result<(), FsError> {
        let meta = fs::symlink_metadata(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        if meta.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        }
        .map_err(|e| FsError::from_io(path, e))?;
        debug!("removed");
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileStat, FsError> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        Ok(FileStat {
            is_dir: meta.is_dir(),
            size: meta.len(),
            modified: to_utc(meta.modified()),
            accessed: to_utc(meta.accessed()),
            created: to_utc(meta.created()),
            readonly: meta.permissions().readonly(),
            mode: mode_of(&meta),
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool, FsError> {
        fs::try_exists(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn list_children(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        let mut reader = fs::read_dir(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        let mut children = Vec::new();

        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(path, e))?
        {
            let child_path: PathBuf = item.path();
            let meta = match item.metadata().await {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(FsError::from_io(&child_path, e)),
            };
            let raw_name = item.file_name();
            let lossy_name = raw_name.to_str().is_none();
            if lossy_name {
                warn!(path = %child_path.display(), "File name is not valid UTF-8");
            }
            children.push(DirEntry {
                name: raw_name.to_string_lossy().into_owned(),
                lossy_name,
                path: child_path,
                is_dir: meta.is_dir(),
                size: meta.len(),
                modified: to_utc(meta.modified()),
            });
        }

        children.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = children.len(), "directory listed");
        Ok(children)
    }

    #[instrument(skip(self, sink), fields(path = %path.display()))]
    async fn read_into(
        &self,
        path: &Path,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, FsError> {
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        let n = tokio::io::copy(&mut file, sink)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        sink.flush().await.map_err(|e| FsError::from_io(path, e))?;
        debug!(bytes = n, "file streamed");
        Ok(n)
    }
}

// ============================================================================
// Unit tests
// ============================================================================
