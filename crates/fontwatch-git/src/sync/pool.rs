//! One fetcher per remote URL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fontwatch_core::JobQueue;
use parking_lot::Mutex;
use tracing::debug;

use super::GitFetcher;
use crate::error::GitError;
use crate::repository::{FetchConfig, GitRepository, GixRepository};

type Opener = dyn Fn(&Path) -> Result<Arc<dyn GitRepository>, GitError> + Send + Sync;

/// Hands out a [`GitFetcher`] per remote URL, each on its own mirror.
///
/// Separate mirrors let fetches of unrelated upstreams run in parallel while
/// the `git.lock` discipline still holds per mirror path.
#[derive(Clone)]
pub struct FetcherPool {
    queue: JobQueue,
    config: FetchConfig,
    opener: Arc<Opener>,
    fetchers: Arc<Mutex<HashMap<PathBuf, GitFetcher>>>,
}

impl FetcherPool {
    /// Opens (or initializes) bare gix mirrors under the configured directory.
    pub fn new(queue: JobQueue, config: FetchConfig) -> Self {
        Self::with_opener(queue, config, |path| {
            Ok(Arc::new(GixRepository::open_or_init(path)?) as Arc<dyn GitRepository>)
        })
    }

    /// Uses a custom repository opener, e.g. to back every URL with one
    /// in-memory repository.
    pub fn with_opener<F>(queue: JobQueue, config: FetchConfig, opener: F) -> Self
    where
        F: Fn(&Path) -> Result<Arc<dyn GitRepository>, GitError> + Send + Sync + 'static,
    {
        Self {
            queue,
            config,
            opener: Arc::new(opener),
            fetchers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Returns the fetcher for `url`, opening its mirror on first use.
    pub fn fetcher(&self, url: &str) -> Result<GitFetcher, GitError> {
        let path = self.config.repository_path(url);
        let mut fetchers = self.fetchers.lock();
        if let Some(fetcher) = fetchers.get(&path) {
            return Ok(fetcher.clone());
        }

        debug!(url = %url, path = %path.display(), "opening mirror");
        let repo = (self.opener)(&path)?;
        let fetcher = GitFetcher::new(repo, self.queue.clone(), self.config.clone());
        fetchers.insert(path, fetcher.clone());
        Ok(fetcher)
    }
}

impl std::fmt::Debug for FetcherPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherPool")
            .field("repositories_dir", &self.config.repositories_dir())
            .field("open", &self.fetchers.lock().len())
            .finish()
    }
}
