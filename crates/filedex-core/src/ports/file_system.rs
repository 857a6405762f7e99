//! Filesystem port (driven/secondary port)
//!
//! Thin async primitives over the physical tree under the storage root.
//!
//! ## Design Notes
//!
//! - Every creating primitive is exclusive: it fails with
//!   [`FsError::AlreadyExists`] instead of overwriting.
//! - Errors are normalized into three kinds so the core can map them
//!   without inspecting platform error codes.
//! - No primitive leaves a partially created object behind on failure,
//!   except a cross-device move whose source could not be removed, which
//!   is reported as [`FsError::Io`].

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

// ============================================================================
// FsError
// ============================================================================

/// Normalized filesystem failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    /// The path (or a component of it) does not exist
    #[error("No such file or directory: {}", .0.display())]
    NotFound(PathBuf),

    /// The destination is already occupied
    #[error("Already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Any other I/O failure
    #[error("I/O failure at {}: {message}", path.display())]
    Io {
        /// Path the failing call operated on
        path: PathBuf,
        /// Underlying error text
        message: String,
    },
}

impl FsError {
    /// Classifies an `io::Error` raised while operating on `path`
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path.to_path_buf()),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_path_buf()),
            _ => FsError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }

    /// Builds an [`FsError::Io`] from a message
    pub fn io(path: &Path, message: impl Into<String>) -> Self {
        FsError::Io {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Returns the path the error refers to
    pub fn path(&self) -> &Path {
        match self {
            FsError::NotFound(p) | FsError::AlreadyExists(p) => p,
            FsError::Io { path, .. } => path,
        }
    }
}

// ============================================================================
// FileStat / DirEntry
// ============================================================================

/// Metadata snapshot of a disk object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStat {
    /// Whether the object is a directory
    pub is_dir: bool,
    /// Size in bytes (platform value for directories)
    pub size: u64,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
    /// Last access time
    pub accessed: Option<DateTime<Utc>>,
    /// Creation time, where the platform records it
    pub created: Option<DateTime<Utc>>,
    /// Read-only flag
    pub readonly: bool,
    /// Unix permission bits
    pub mode: Option<u32>,
}

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// File name of the child
    pub name: String,
    /// True when the on-disk name is not valid UTF-8; `name` is then a
    /// lossy rendering that cannot address the object
    pub lossy_name: bool,
    /// Absolute path of the child
    pub path: PathBuf,
    /// Whether the child is a directory
    pub is_dir: bool,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
}

// ============================================================================
// IFileSystem
// ============================================================================

/// Port trait for disk primitives
#[async_trait::async_trait]
pub trait IFileSystem: Send + Sync {
    /// Creates a single directory; the parent must exist
    async fn mkdir(&self, path: &Path) -> Result<(), FsError>;

    /// Creates an empty file
    async fn touch(&self, path: &Path) -> Result<(), FsError>;

    /// Creates a file from a byte stream, returning the number of bytes written
    ///
    /// The partial file is removed if the stream fails.
    async fn write_new(
        &self,
        path: &Path,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, FsError>;

    /// Copies a single file to a new destination, returning its size
    async fn copy_file(&self, from: &Path, to: &Path) -> Result<u64, FsError>;

    /// Copies a directory tree to a new destination
    async fn copy_tree(&self, from: &Path, to: &Path) -> Result<(), FsError>;

    /// Moves a file or directory to a destination that must not exist
    async fn move_path(&self, from: &Path, to: &Path) -> Result<(), FsError>;

    /// Removes a file or directory tree
    async fn remove_tree(&self, path: &Path) -> Result<(), FsError>;

    /// Returns metadata of the object at `path`
    async fn stat(&self, path: &Path) -> Result<FileStat, FsError>;

    /// Returns true if anything exists at `path`
    async fn exists(&self, path: &Path) -> Result<bool, FsError>;

    /// Lists the children of a directory, sorted by name
    async fn list_children(&self, path: &Path) -> Result<Vec<DirEntry>, FsError>;

    /// Streams a file's contents into `sink`, returning the byte count
    async fn read_into(
        &self,
        path: &Path,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, FsError>;
}
