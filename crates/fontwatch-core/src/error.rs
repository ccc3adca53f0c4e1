//! Error types shared by fontwatch sources and the job queue.
//!
//! Every source operation returns `Result<T, SourceError>`. Crates with
//! their own failure domains (git, CSV parsing, process state) define
//! their own enums and convert into [`SourceError`] at the source boundary.
//!
//! # Example
//!
//! ```
//! use fontwatch_core::{Result, SourceError};
//!
//! fn lookup(family: &str) -> Result<()> {
//!     Err(SourceError::family_not_found("upstream", family))
//! }
//!
//! let err = lookup("Test Sans").unwrap_err();
//! assert!(err.is_not_found());
//! ```

use std::io;

use thiserror::Error;

/// Failure of a job scheduled on the [`JobQueue`](crate::JobQueue).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The job panicked or its worker went away before reporting.
    #[error("job on queue '{key}' aborted: {reason}")]
    Aborted { key: String, reason: String },
}

impl QueueError {
    /// Creates an aborted error.
    pub fn aborted(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Aborted {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Main error type for source operations.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No source is registered under the id.
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    /// The family does not exist in the source.
    #[error("family '{family}' not found in source '{source_id}'")]
    FamilyNotFound { source_id: String, family: String },

    /// Network or repository transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A network-client deadline expired.
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Input failed validation (catalog rows, pull requests, payloads).
    #[error("validation error: {0}")]
    Validation(String),

    /// Caching or publishing a family failed.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// A queued job did not complete.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// At least one family of an update pass failed.
    #[error("{failed} of {total} families failed; first error: {first}")]
    PartialFailure {
        failed: usize,
        total: usize,
        first: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SourceError {
    pub fn family_not_found(source_id: impl Into<String>, family: impl Into<String>) -> Self {
        Self::FamilyNotFound {
            source_id: source_id.into(),
            family: family.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for missing sources or families.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownSource(_) | Self::FamilyNotFound { .. })
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

/// Convenience alias for source results.
pub type Result<T, E = SourceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SourceError::family_not_found("upstream", "Test Sans");
        assert_eq!(
            err.to_string(),
            "family 'Test Sans' not found in source 'upstream'"
        );

        let err = SourceError::PartialFailure {
            failed: 1,
            total: 3,
            first: "boom".into(),
        };
        assert_eq!(err.to_string(), "1 of 3 families failed; first error: boom");

        let err: SourceError = QueueError::aborted("cache", "panicked").into();
        assert_eq!(err.to_string(), "job on queue 'cache' aborted: panicked");
    }

    #[test]
    fn test_error_queries() {
        assert!(SourceError::UnknownSource("x".into()).is_not_found());
        assert!(SourceError::transport("connection reset").is_transient());
        assert!(SourceError::Timeout { seconds: 30 }.is_transient());
        assert!(!SourceError::validation("bad row").is_transient());
        assert!(!SourceError::internal("oops").is_not_found());
    }
}
