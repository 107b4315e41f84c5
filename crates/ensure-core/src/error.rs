//! Common error types for ensure.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the ensure system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// A power state string was not `on` or `off`.
    #[error("invalid power state: {0}")]
    InvalidPowerState(String),

    /// An attribute value had the wrong shape for its key.
    #[error("invalid attribute {key}: {reason}")]
    InvalidAttribute {
        /// The attribute key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}
