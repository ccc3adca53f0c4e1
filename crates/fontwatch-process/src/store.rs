//! Process persistence with optimistic versioning.
//!
//! Every stored document carries a version that increases on each write.
//! A writer passes the version it read; a mismatch means another writer
//! got there first and the write fails with [`ProcessError::Conflict`]
//! instead of silently overwriting.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{ProcessError, Result};

/// A stored process document and its version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProcess {
    pub version: u64,
    pub state: Value,
}

/// Storage backend for process state.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Stores a new process at version 1.
    async fn insert(&self, id: &str, state: Value) -> Result<u64>;

    async fn load(&self, id: &str) -> Result<StoredProcess>;

    /// Replaces the document if it is still at `expected_version` and
    /// returns the new version.
    async fn replace(&self, id: &str, expected_version: u64, state: Value) -> Result<u64>;
}

/// In-memory [`ProcessStore`].
#[derive(Debug, Default)]
pub struct MemoryProcessStore {
    processes: RwLock<HashMap<String, StoredProcess>>,
}

impl MemoryProcessStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.processes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.read().is_empty()
    }

    /// Overwrites a document without a version check.
    pub fn put_raw(&self, id: &str, state: Value) {
        let mut processes = self.processes.write();
        let version = processes.get(id).map_or(1, |p| p.version + 1);
        processes.insert(id.to_string(), StoredProcess { version, state });
    }
}

#[async_trait]
impl ProcessStore for MemoryProcessStore {
    async fn insert(&self, id: &str, state: Value) -> Result<u64> {
        let mut processes = self.processes.write();
        if processes.contains_key(id) {
            return Err(ProcessError::AlreadyExists(id.to_string()));
        }
        processes.insert(id.to_string(), StoredProcess { version: 1, state });
        Ok(1)
    }

    async fn load(&self, id: &str) -> Result<StoredProcess> {
        self.processes
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ProcessError::NotFound(id.to_string()))
    }

    async fn replace(&self, id: &str, expected_version: u64, state: Value) -> Result<u64> {
        let mut processes = self.processes.write();
        let stored = processes
            .get_mut(id)
            .ok_or_else(|| ProcessError::NotFound(id.to_string()))?;
        if stored.version != expected_version {
            return Err(ProcessError::Conflict {
                id: id.to_string(),
                expected: expected_version,
                found: stored.version,
            });
        }
        stored.version += 1;
        stored.state = state;
        Ok(stored.version)
    }
}
