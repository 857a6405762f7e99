//! FileDex Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Entry`, `RecycleItem`, `Actor` and their identifiers
//! - **Index** - the authoritative tree store and its invariant checks
//! - **PathResolver** - materialized path computation and propagation
//! - **Port definitions** - Traits for adapters: `IIndexRepository`,
//!   `IRecycleRepository`, `IFileSystem`, `IEventSink`
//! - **Naming policy** - name validation and collision-free candidates
//!
//! # Architecture
//!
//! The domain module contains pure data types with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! `Index` and `PathResolver` operate purely through the ports, so the
//! engine in `filedex-sync` can be exercised against any storage backend.

pub mod config;
pub mod domain;
pub mod error;
pub mod index;
pub mod naming;
pub mod path_resolver;
pub mod ports;

pub use error::{CoreError, ErrorKind};
pub use index::Index;
pub use path_resolver::PathResolver;

#[cfg(test)]
pub(crate) mod test_support;
