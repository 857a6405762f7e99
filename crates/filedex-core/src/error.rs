//! Operation-level error taxonomy
//!
//! [`CoreError`] is what every tree operation returns. Port errors and
//! domain validation errors convert into it with `?`.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::domain::{DomainError, EntryId};
use crate::ports::{FsError, RepositoryError};

/// Errors returned by index and tree operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Entry, parent or recycle item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Name collision or occupied destination
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request is well-formed but not allowed on this tree
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A disk call failed or left partial state at `path`
    #[error("I/O failure at {}: {message}", path.display())]
    IoFailure {
        /// Effective subtree path of the failure
        path: PathBuf,
        /// Underlying error text
        message: String,
    },

    /// An ancestor reference points at a missing entry
    #[error("Broken parent chain at entry {0}")]
    BrokenChain(EntryId),

    /// The actor is not allowed to perform this operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Disk and index disagree and compensation failed; reconciliation has
    /// been requested
    #[error("Index and disk diverged at {}: {message}", path.display())]
    Divergence {
        /// Path whose state is uncertain
        path: PathBuf,
        /// What failed
        message: String,
    },

    /// The operation was cancelled; partial state is left for reconciliation
    #[error("Cancelled at {}", path.display())]
    Cancelled {
        /// Next node that was not processed
        path: PathBuf,
    },

    /// Index storage failure
    #[error("Index failure: {0}")]
    Index(String),
}

/// Stable classification of a [`CoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidOperation,
    IoFailure,
    BrokenChain,
    Unauthorized,
    Divergence,
    Cancelled,
    Index,
}

impl ErrorKind {
    /// Snake-case name used in JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidOperation => "invalid_operation",
            ErrorKind::IoFailure => "io_failure",
            ErrorKind::BrokenChain => "broken_chain",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Divergence => "divergence",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Index => "index",
        }
    }

    /// Process exit code used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::NotFound => 2,
            ErrorKind::Conflict => 3,
            ErrorKind::InvalidOperation => 4,
            ErrorKind::Unauthorized => 5,
            ErrorKind::Cancelled => 6,
            ErrorKind::IoFailure | ErrorKind::Divergence => 7,
            ErrorKind::BrokenChain | ErrorKind::Index => 8,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CoreError {
    /// Returns the classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            CoreError::IoFailure { .. } => ErrorKind::IoFailure,
            CoreError::BrokenChain(_) => ErrorKind::BrokenChain,
            CoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            CoreError::Divergence { .. } => ErrorKind::Divergence,
            CoreError::Cancelled { .. } => ErrorKind::Cancelled,
            CoreError::Index(_) => ErrorKind::Index,
        }
    }

    /// Shorthand for [`CoreError::IoFailure`]
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CoreError::IoFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Re-targets an I/O failure at another path, leaving other kinds alone
    pub fn at_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            CoreError::IoFailure { message, .. } => CoreError::IoFailure {
                path: path.into(),
                message,
            },
            other => other,
        }
    }
}

impl From<DomainError> for CoreError {
    fn from(err: DomainError) -> Self {
        CoreError::InvalidOperation(err.to_string())
    }
}

impl From<FsError> for CoreError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound(path) => CoreError::IoFailure {
                path,
                message: "missing on disk".to_string(),
            },
            FsError::AlreadyExists(path) => {
                CoreError::Conflict(format!("{} already exists on disk", path.display()))
            }
            FsError::Io { path, message } => CoreError::IoFailure { path, message },
        }
    }
}

impl From<RepositoryError> for CoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate(msg) => CoreError::Conflict(msg),
            RepositoryError::MissingParent(msg) => CoreError::NotFound(msg),
            RepositoryError::Backend(msg) => CoreError::Index(msg),
        }
    }
}
