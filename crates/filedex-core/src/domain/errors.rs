//! Domain error types
//!
//! This module defines error types specific to domain validation:
//! malformed identifiers and names that can never be stored.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid entry name (empty, separator, reserved, too long)
    #[error("Invalid name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Invalid entry kind string
    #[error("Invalid entry kind: {0}")]
    InvalidKind(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl DomainError {
    /// Shorthand for an [`DomainError::InvalidName`]
    pub fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
