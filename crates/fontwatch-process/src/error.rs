//! Error types of the process engine.
//!
//! Three layers: [`StateError`] for persisted state that does not match the
//! schema, [`TicketError`] for answers that must be rejected, and
//! [`ProcessError`] for everything an engine operation can return.

use fontwatch_core::QueueError;
use thiserror::Error;

/// Stored state is incompatible with the task's schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    /// Every problem found while loading, in field order.
    #[error("state is incompatible:\n{}", .0.join("\n"))]
    Incompatible(Vec<String>),

    /// The stored document is not a JSON object.
    #[error("state must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A field could not be serialized.
    #[error("can't serialize field '{field}': {message}")]
    Serialize { field: String, message: String },
}

impl StateError {
    /// The individual issues, if any were collected.
    pub fn issues(&self) -> &[String] {
        match self {
            Self::Incompatible(issues) => issues,
            _ => &[],
        }
    }
}

/// An answer's ticket was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("malformed ticket")]
    Malformed,

    /// No answer is expected right now.
    #[error("no answer is expected")]
    NotExpected,

    /// The answer targets another callback than the one expected.
    #[error("callback '{received}' does not match the expected callback")]
    WrongCallback { received: String },

    /// The ticket was not issued for this expectation or this secret.
    #[error("ticket does not match")]
    Mismatch,
}

/// Main error type of the process engine.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process '{0}' not found")]
    NotFound(String),

    #[error("process '{0}' already exists")]
    AlreadyExists(String),

    /// Answer rejected; the process was not touched.
    #[error("answer rejected: {0}")]
    Rejected(#[from] TicketError),

    #[error(transparent)]
    State(#[from] StateError),

    /// A callback or interaction name that the task type does not register.
    #[error("unknown {kind} '{name}'")]
    Unregistered { kind: &'static str, name: String },

    /// An interaction definition breaks the field rules.
    #[error("invalid interaction: {0}")]
    Interaction(String),

    /// A task handler refused its input.
    #[error("{0}")]
    Task(String),

    /// The stored version moved while the process was being changed.
    #[error("process '{id}' changed concurrently (expected version {expected}, found {found})")]
    Conflict { id: String, expected: u64, found: u64 },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ProcessError {
    /// Creates a task failure with a message meant for the answering user.
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task(message.into())
    }

    pub fn unregistered_callback(name: impl Into<String>) -> Self {
        Self::Unregistered {
            kind: "callback",
            name: name.into(),
        }
    }

    pub fn unregistered_interaction(name: impl Into<String>) -> Self {
        Self::Unregistered {
            kind: "interaction",
            name: name.into(),
        }
    }

    /// Returns true if the request was refused before any state changed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Unregistered { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for process operations.
pub type Result<T, E = ProcessError> = std::result::Result<T, E>;
