//! Domain entities
//!
//! This module contains the core domain types for FileDex:
//! - Newtypes for type-safe identifiers
//! - Index entries (files and folders)
//! - Recycle bin items
//! - Actors performing operations
//! - Domain-specific error types

pub mod actor;
pub mod entry;
pub mod errors;
pub mod newtypes;
pub mod recycle;

// Re-export commonly used types
pub use actor::Actor;
pub use entry::{Entry, EntryKind, EntryProperties};
pub use errors::DomainError;
pub use newtypes::*;
pub use recycle::RecycleItem;
