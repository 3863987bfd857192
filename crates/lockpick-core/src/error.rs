//! Error types for lockpick-core

use thiserror::Error;

/// Core error type for lock operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Target node or lock path does not exist
    #[error("Lock {0} does not exist!")]
    NotFound(String),

    /// Release attempted with an identity that differs from the stored one
    #[error("Identifier mismatch on {path}, got '{found}'")]
    IdentityMismatch {
        /// Node whose release was refused
        path: String,
        /// Identity stored in the node
        found: String,
    },

    /// Bounded wait exhausted without the node becoming eligible
    #[error("Timed out acquiring lock on {0}")]
    AcquisitionTimeout(String),

    /// External interruption while acquiring
    #[error("Interrupted while acquiring lock on {0}")]
    Interrupted(String),

    /// The acquiring worker observed its cancellation token
    #[error("Acquisition of {0} was cancelled")]
    Cancelled(String),

    /// Unknown lock mode requested
    #[error("Unknown lock action {0}")]
    UnknownMode(String),

    /// Malformed lock or node path
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// Offending input
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network or session failure from the coordination service
    #[error("Coordination service error: {0}")]
    Coordination(String),
}

impl Error {
    /// Create a coordination service error
    pub fn coordination(msg: impl Into<String>) -> Self {
        Self::Coordination(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the node or path is absent
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Process exit code for this error.
    ///
    /// Every failure of a lockpick command exits with 1.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }
}

/// Result type alias for lockpick-core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_the_path() {
        let err = Error::NotFound("/jobs/nightly/x__lock__0000000001".to_string());
        assert_eq!(
            err.to_string(),
            "Lock /jobs/nightly/x__lock__0000000001 does not exist!"
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_every_error_exits_with_one() {
        let errors = [
            Error::NotFound("/a".into()),
            Error::AcquisitionTimeout("/a".into()),
            Error::UnknownMode("zlock".into()),
            Error::coordination("connection loss"),
        ];
        assert!(errors.iter().all(|e| e.exit_code() == 1));
    }
}
