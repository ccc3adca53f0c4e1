//! Shared fixtures for the watch tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use fontwatch_core::{CacheKey, FamilyDescriptor, FamilyDispatcher, JobQueue, Result, SourceError};
use fontwatch_git::{
    FetchConfig, GitError, GitFetcher, GitRepository, MemoryRepository, PullRequest, PullRequestPage,
    PullRequestProvider,
};
use parking_lot::Mutex;

pub const CATALOG_URL: &str = "https://github.com/google/fonts.git";
pub const CATALOG_REMOTE: &str = "google/fonts";

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

pub fn fetcher(repo: &Arc<MemoryRepository>) -> GitFetcher {
    let config = FetchConfig::builder()
        .repositories_dir("/tmp/fontwatch-tests")
        .max_parallel_families(2)
        .build()
        .unwrap();
    GitFetcher::new(Arc::clone(repo) as Arc<dyn GitRepository>, JobQueue::new(), config)
}

/// Serves a fixed list of pull requests, two per page.
#[derive(Default)]
pub struct StaticProvider {
    pub pull_requests: Mutex<Vec<PullRequest>>,
    pub pages_served: Mutex<usize>,
}

#[async_trait]
impl PullRequestProvider for StaticProvider {
    async fn open_pull_requests(
        &self,
        _base_branch: &str,
        after: Option<String>,
    ) -> std::result::Result<PullRequestPage, GitError> {
        *self.pages_served.lock() += 1;
        let start: usize = after.map(|c| c.parse().unwrap()).unwrap_or(0);
        let all = self.pull_requests.lock().clone();
        let end = (start + 2).min(all.len());
        Ok(PullRequestPage {
            pull_requests: all[start..end].to_vec(),
            next_cursor: (end < all.len()).then(|| end.to_string()),
        })
    }
}
