//! FileDex Audit - Per-entry event logs
//!
//! Provides:
//! - `FileEventLog`: `IEventSink` adapter writing one append-only file per entry
//! - `AuditLogger`: High-level service with one method per tree operation,
//!   never failing the operation it records

pub mod event_log;
pub mod logger;

pub use event_log::FileEventLog;
pub use logger::AuditLogger;
