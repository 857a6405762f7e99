//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the traits the core depends on. Their implementations live in
//! adapter crates: `filedex-cache` for the repositories, `filedex-sync` for
//! the filesystem, and `filedex-audit` for the event sink.
//!
//! ## Ports Overview
//!
//! - [`IIndexRepository`] - Persistent store of [`Entry`](crate::domain::Entry) records
//! - [`IRecycleRepository`] - Persistent store of recycle bin records
//! - [`IFileSystem`] - Disk primitives under the storage root
//! - [`IEventSink`] - Per-entry append-only event log

pub mod event_sink;
pub mod file_system;
pub mod index_repository;
pub mod recycle_repository;

pub use event_sink::IEventSink;
pub use file_system::{DirEntry, FileStat, FsError, IFileSystem};
pub use index_repository::{IIndexRepository, RepositoryError};
pub use recycle_repository::IRecycleRepository;
