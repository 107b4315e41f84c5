//! Error types for the convergence engine.
//!
//! Only validation failures escape an `ensure_*` call. Everything that happens
//! after dispatch (command errors, timeouts, exhaustion) is contained by the
//! engine and surfaced through the notification sink instead.

use ensure_core::CoreError;
use thiserror::Error;

/// A result type using `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The target resolved to zero entities.
    #[error("no entities specified")]
    NoEntities,

    /// A configuration value was outside its accepted range.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A core type rejected its input.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The hub rejected or failed a request.
    #[error("platform error: {0}")]
    Platform(String),

    /// Transport failure talking to the hub.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EngineError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::NoEntities | Self::InvalidConfig { .. } | Self::Core(_) => 400,
            Self::Platform(_) | Self::Http(_) => 502,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Platform(_) | Self::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(EngineError::NoEntities.http_status_code(), 400);
        assert_eq!(
            EngineError::InvalidConfig {
                field: "max_retries",
                reason: "must be between 1 and 10".into(),
            }
            .http_status_code(),
            400
        );
        assert_eq!(
            EngineError::Platform("bad gateway".into()).http_status_code(),
            502
        );
    }

    #[test]
    fn retriable_errors() {
        assert!(EngineError::Platform("timeout".into()).is_retriable());
        assert!(!EngineError::NoEntities.is_retriable());
    }

    #[test]
    fn no_entities_message() {
        assert_eq!(EngineError::NoEntities.to_string(), "no entities specified");
    }
}
