//! Shared fixtures for the source tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use fontwatch_core::{CacheKey, FamilyDescriptor, FamilyDispatcher, JobQueue, Report, Reporter, Result, SourceError};
use fontwatch_git::{FetchConfig, FetcherPool, GitRepository, MemoryRepository};
use parking_lot::Mutex;
use tempfile::NamedTempFile;

/// Remembers every dispatched family; fails families named in `failing`.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub dispatched: Mutex<Vec<FamilyDescriptor>>,
    pub failing: Mutex<Vec<String>>,
}

impl RecordingDispatcher {
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .dispatched
            .lock()
            .iter()
            .map(|f| f.family_name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn family(&self, name: &str) -> FamilyDescriptor {
        self.dispatched
            .lock()
            .iter()
            .find(|f| f.family_name == name)
            .cloned()
            .unwrap_or_else(|| panic!("{name} was not dispatched"))
    }

    pub fn clear(&self) {
        self.dispatched.lock().clear();
    }
}

#[async_trait]
impl FamilyDispatcher for RecordingDispatcher {
    async fn dispatch(&self, _source_id: &str, family: FamilyDescriptor) -> Result<CacheKey> {
        if self.failing.lock().contains(&family.family_name) {
            return Err(SourceError::dispatch("cache unavailable"));
        }
        let key = CacheKey::new(format!("key-{}", family.family_name));
        self.dispatched.lock().push(family);
        Ok(key)
    }
}

/// Keeps filed reports for inspection.
#[derive(Default)]
pub struct RecordingReporter {
    pub reports: Mutex<Vec<Report>>,
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn file(&self, report: Report) -> Result<()> {
        self.reports.lock().push(report);
        Ok(())
    }
}

/// A pool whose every mirror is the same in-memory repository.
pub fn memory_pool(repo: &Arc<MemoryRepository>) -> FetcherPool {
    let config = FetchConfig::builder()
        .repositories_dir("/tmp/fontwatch-tests")
        .build()
        .unwrap();
    let repo = Arc::clone(repo);
    FetcherPool::with_opener(JobQueue::new(), config, move |_: &Path| {
        Ok(Arc::clone(&repo) as Arc<dyn GitRepository>)
    })
}

/// Writes `contents` to a temporary file and returns it with its `file://` url.
pub fn file_url(contents: impl AsRef<[u8]>) -> (NamedTempFile, String) {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_ref()).unwrap();
    file.flush().unwrap();
    let url = format!("file://{}", file.path().display());
    (file, url)
}

/// Replaces the contents behind a url created by [`file_url`].
pub fn rewrite(file: &NamedTempFile, contents: impl AsRef<[u8]>) {
    std::fs::write(file.path(), contents).unwrap();
}
