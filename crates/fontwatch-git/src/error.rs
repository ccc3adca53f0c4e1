//! Error types for the git synchronization engine.

use fontwatch_core::{QueueError, SourceError};

/// Errors that can occur while fetching or reading git state.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// A same-named remote already points elsewhere.
    #[error("remote '{name}' points to '{existing}', refusing to change it to '{requested}'")]
    RemoteConflict {
        name: String,
        existing: String,
        requested: String,
    },

    /// The remote is not registered in the repository.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// The reference does not exist (locally or at the remote).
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    /// The object id does not resolve to an object of the expected kind.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A family directory yielded no usable font files.
    #[error("no font binaries in '{path}'")]
    EmptyFamily { path: String },

    /// The family name could not be derived from its files.
    #[error("can't determine family name from files in '{path}'")]
    UnnamedFamily { path: String },

    /// The reference name is malformed.
    #[error("invalid reference '{name}': {reason}")]
    InvalidReference { name: String, reason: &'static str },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A git operation failed.
    #[error("git error: {0}")]
    Git(String),

    /// The pull request provider failed.
    #[error("pull request provider error: {0}")]
    Provider(String),

    /// A fetch exceeded its deadline and was interrupted.
    #[error("fetch timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// A queued git job did not complete.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl GitError {
    /// Creates a new Git error.
    pub fn git(msg: impl Into<String>) -> Self {
        Self::Git(msg.into())
    }

    /// Creates a new provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Provider(_))
    }
}

impl From<GitError> for SourceError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::Timeout { seconds } => SourceError::Timeout { seconds },
            GitError::Io(e) => SourceError::Io(e),
            GitError::Queue(e) => SourceError::Queue(e),
            GitError::InvalidReference { .. }
            | GitError::RemoteConflict { .. }
            | GitError::EmptyFamily { .. }
            | GitError::UnnamedFamily { .. } => {
                SourceError::validation(err.to_string())
            }
            other => SourceError::transport(other.to_string()),
        }
    }
}
