//! Task status history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusKind {
    Pending,
    Ok,
    Failed,
    /// Informational; never changes the current status.
    Log,
}

impl StatusKind {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Ok | Self::Failed)
    }
}

/// One history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub status: StatusKind,
    pub details: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Status {
    pub fn new(status: StatusKind, details: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            status,
            details: details.into(),
            created,
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Append-only list of status entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<Status>);

impl History {
    /// History of a freshly created process.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self(vec![Status::new(StatusKind::Pending, "*initial state*", now)])
    }

    pub fn push(&mut self, status: Status) {
        self.0.push(status);
    }

    /// The last entry that is not a log line.
    pub fn current(&self) -> Option<&Status> {
        self.0.iter().rev().find(|s| s.status != StatusKind::Log)
    }

    pub fn is_finished(&self) -> bool {
        self.current().is_some_and(|s| s.status.is_final())
    }

    pub fn entries(&self) -> &[Status] {
        &self.0
    }
}
