//! Git repository access.
//!
//! Everything above this module talks to a repository through the blocking
//! [`GitRepository`] trait. [`GixRepository`] is the on-disk implementation;
//! [`MemoryRepository`] serves tests and dry runs. Callers run these methods
//! on the blocking pool (see [`GitFetcher`](crate::GitFetcher)).

mod config;
mod gix_repo;
mod memory;
mod refs;

use std::fmt;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use config::{FetchConfig, FetchConfigBuilder};
pub use gix_repo::GixRepository;
pub use memory::MemoryRepository;
pub use refs::{RemoteRef, validate_name};

use crate::error::GitError;

/// Hex object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(String);

impl Oid {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Oid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Tree,
    Blob,
    /// Symlinks and submodules; never part of a family.
    Other,
}

/// One entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeEntry {
    pub name: String,
    pub id: Oid,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, id: Oid, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            id,
            kind,
        }
    }

    pub fn is_tree(&self) -> bool {
        self.kind == EntryKind::Tree
    }

    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }
}

/// The parts of a commit fontwatch reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: Oid,
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub time: DateTime<Utc>,
}

/// Blocking access to one repository on disk (or in memory).
///
/// Implementations are not required to be safe against concurrent
/// mutation: callers serialize `ensure_remote` and `fetch` per
/// repository path through the job queue.
pub trait GitRepository: Send + Sync + 'static {
    /// Path identifying the repository; also the queue lock key.
    fn path(&self) -> &Path;

    /// Registers `name` → `url`. Idempotent; a same-named remote pointing
    /// elsewhere is an error unless `allow_update`.
    fn ensure_remote(&self, name: &str, url: &str, allow_update: bool) -> Result<(), GitError>;

    /// Fetches `reference` from the remote into its local mirror ref and
    /// returns the commit it points at. Aborts early once `interrupt` is set.
    fn fetch(
        &self,
        remote_name: &str,
        remote_url: &str,
        reference: &RemoteRef,
        interrupt: &AtomicBool,
    ) -> Result<Oid, GitError>;

    /// Resolves a full local reference name, `None` if it does not exist.
    fn resolve(&self, reference: &str) -> Result<Option<Oid>, GitError>;

    fn commit(&self, id: &Oid) -> Result<CommitInfo, GitError>;

    /// Entries of a tree, in storage order.
    fn tree(&self, id: &Oid) -> Result<Vec<TreeEntry>, GitError>;

    fn blob(&self, id: &Oid) -> Result<Vec<u8>, GitError>;
}

/// Directory name for the local mirror of a remote URL.
///
/// Strips the protocol, replaces `/` with `_` and drops leading dots.
/// Results of three characters or fewer fall back to `__fallback__`.
///
/// ```
/// use fontwatch_git::repository_directory;
///
/// assert_eq!(repository_directory("https://github.com/a/B"), "github.com_a_B");
/// assert_eq!(repository_directory("file:///x"), "__fallback__");
/// ```
pub fn repository_directory(url: &str) -> String {
    let without_protocol = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    let flattened = without_protocol.replace('/', "_");
    let trimmed = flattened.trim_start_matches('.');

    if trimmed.len() <= 3 {
        "__fallback__".to_string()
    } else {
        trimmed.to_string()
    }
}
