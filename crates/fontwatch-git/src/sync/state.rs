//! Per-reference synchronization state.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

use crate::repository::{Oid, RemoteRef};

/// Tracks one watched `(remote, reference)` across update cycles.
///
/// `head` is whatever the last successful fetch returned; `last_seen_commit`
/// is the diff cursor and only advances once a pass over that commit has
/// settled without failures.
#[derive(Debug)]
pub struct GitReferenceState {
    remote_name: String,
    remote_url: String,
    reference: RemoteRef,
    head: RwLock<Option<Oid>>,
    last_seen_commit: RwLock<Option<Oid>>,
    last_refresh: RwLock<Option<Instant>>,
    last_error: RwLock<Option<String>>,
    failure_count: RwLock<u32>,
}

/// Serializable view used in source details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSnapshot {
    pub remote_name: String,
    pub remote_url: String,
    pub reference_name: String,
    pub head: Option<String>,
    pub last_seen_commit: Option<String>,
    pub last_error: Option<String>,
}

impl GitReferenceState {
    /// Creates a new state with no commits seen.
    pub fn new(
        remote_name: impl Into<String>,
        remote_url: impl Into<String>,
        reference: RemoteRef,
    ) -> Self {
        Self {
            remote_name: remote_name.into(),
            remote_url: remote_url.into(),
            reference,
            head: RwLock::new(None),
            last_seen_commit: RwLock::new(None),
            last_refresh: RwLock::new(None),
            last_error: RwLock::new(None),
            failure_count: RwLock::new(0),
        }
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    pub fn reference(&self) -> &RemoteRef {
        &self.reference
    }

    /// Local mirror ref of the watched reference.
    pub fn local_ref(&self) -> String {
        self.reference.local_ref(&self.remote_name)
    }

    /// Commit returned by the last successful fetch.
    pub fn head(&self) -> Option<Oid> {
        self.head.read().clone()
    }

    /// The diff cursor.
    pub fn last_seen_commit(&self) -> Option<Oid> {
        self.last_seen_commit.read().clone()
    }

    /// Moves the diff cursor.
    pub fn advance(&self, commit: Oid) {
        *self.last_seen_commit.write() = Some(commit);
    }

    /// Records a successful fetch.
    pub fn record_fetch(&self, commit: Oid) {
        let mut head = self.head.write();
        let mut last_refresh = self.last_refresh.write();
        let mut last_error = self.last_error.write();
        let mut failure_count = self.failure_count.write();

        *head = Some(commit);
        *last_refresh = Some(Instant::now());
        *last_error = None;
        *failure_count = 0;
    }

    /// Records a failed fetch.
    pub fn record_failure(&self, error: impl Into<String>) {
        let mut last_error = self.last_error.write();
        let mut failure_count = self.failure_count.write();

        *last_error = Some(error.into());
        *failure_count += 1;
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Number of consecutive failed fetches.
    pub fn failure_count(&self) -> u32 {
        *self.failure_count.read()
    }

    /// Returns true if the last fetch succeeded.
    pub fn is_healthy(&self) -> bool {
        self.head.read().is_some() && self.last_error.read().is_none()
    }

    /// Returns true if no fetch succeeded within `interval`.
    pub fn needs_refresh(&self, interval: Duration) -> bool {
        match *self.last_refresh.read() {
            Some(at) => at.elapsed() >= interval,
            None => true,
        }
    }

    /// Forgets every commit, so the next pass starts from scratch.
    pub fn reset(&self) {
        let mut head = self.head.write();
        let mut last_seen = self.last_seen_commit.write();
        let mut last_refresh = self.last_refresh.write();
        let mut last_error = self.last_error.write();
        let mut failure_count = self.failure_count.write();

        *head = None;
        *last_seen = None;
        *last_refresh = None;
        *last_error = None;
        *failure_count = 0;
    }

    pub fn snapshot(&self) -> ReferenceSnapshot {
        ReferenceSnapshot {
            remote_name: self.remote_name.clone(),
            remote_url: self.remote_url.clone(),
            reference_name: self.reference.to_string(),
            head: self.head().map(|c| c.to_string()),
            last_seen_commit: self.last_seen_commit().map(|c| c.to_string()),
            last_error: self.last_error(),
        }
    }
}
