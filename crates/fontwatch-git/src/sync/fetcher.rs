//! Queue-guarded fetching.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fontwatch_core::JobQueue;
use tracing::{debug, info, warn};

use super::GitReferenceState;
use crate::error::GitError;
use crate::repository::{CommitInfo, FetchConfig, GitRepository, Oid, RemoteRef};

/// Shared fetch helper composed into every git-backed source.
///
/// Every mutation of the repository (remote registration, fetch) runs on the
/// job queue under `git.lock <repository path>`, so at most one of them is in
/// flight per repository. Reads go straight to the blocking pool.
#[derive(Clone)]
pub struct GitFetcher {
    repo: Arc<dyn GitRepository>,
    queue: JobQueue,
    config: Arc<FetchConfig>,
}

impl GitFetcher {
    pub fn new(repo: Arc<dyn GitRepository>, queue: JobQueue, config: FetchConfig) -> Self {
        Self {
            repo,
            queue,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn repository(&self) -> Arc<dyn GitRepository> {
        Arc::clone(&self.repo)
    }

    /// Queue key guarding this repository.
    pub fn lock_key(&self) -> String {
        format!("git.lock {}", self.repo.path().display())
    }

    /// Registers a remote under the repository lock.
    pub async fn ensure_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        let repo = Arc::clone(&self.repo);
        let (name, url) = (name.to_string(), url.to_string());
        let allow_update = self.config.allow_remote_update();

        self.queue
            .schedule(self.lock_key(), move || async move {
                tokio::task::spawn_blocking(move || repo.ensure_remote(&name, &url, allow_update))
                    .await
                    .map_err(|e| GitError::git(format!("Remote task failed: {}", e)))?
            })
            .await?
    }

    /// Fetches the watched reference and records the outcome on `state`.
    pub async fn fetch(&self, state: &GitReferenceState) -> Result<Oid, GitError> {
        let result = self
            .fetch_ref(
                state.remote_name(),
                state.remote_url(),
                state.reference().clone(),
            )
            .await;

        match &result {
            Ok(commit) => state.record_fetch(commit.clone()),
            Err(e) => state.record_failure(e.to_string()),
        }
        result
    }

    /// Registers the remote if needed and fetches one reference.
    ///
    /// On deadline expiry the fetch is interrupted and the lock is held until
    /// it has actually stopped.
    pub async fn fetch_ref(
        &self,
        remote_name: &str,
        remote_url: &str,
        reference: RemoteRef,
    ) -> Result<Oid, GitError> {
        reference.validate()?;

        let repo = Arc::clone(&self.repo);
        let (remote_name, remote_url) = (remote_name.to_string(), remote_url.to_string());
        let allow_update = self.config.allow_remote_update();
        let timeout = self.config.fetch_timeout();

        info!(remote = %remote_name, reference = %reference, "fetching");

        self.queue
            .schedule(self.lock_key(), move || async move {
                let interrupt = Arc::new(AtomicBool::new(false));
                let flag = Arc::clone(&interrupt);
                let mut task = tokio::task::spawn_blocking(move || {
                    repo.ensure_remote(&remote_name, &remote_url, allow_update)?;
                    repo.fetch(&remote_name, &remote_url, &reference, &flag)
                });

                match tokio::time::timeout(timeout, &mut task).await {
                    Ok(joined) => {
                        let commit = joined
                            .map_err(|e| GitError::git(format!("Fetch task failed: {}", e)))??;
                        debug!(commit = %commit.short(), "fetched");
                        Ok(commit)
                    },
                    Err(_) => {
                        interrupt.store(true, Ordering::SeqCst);
                        let _ = task.await;
                        warn!(seconds = timeout.as_secs(), "fetch deadline exceeded");
                        Err(GitError::Timeout {
                            seconds: timeout.as_secs(),
                        })
                    },
                }
            })
            .await?
    }

    /// Runs a read-only closure against the repository on the blocking pool.
    pub async fn read<T, F>(&self, f: F) -> Result<T, GitError>
    where
        F: FnOnce(&dyn GitRepository) -> Result<T, GitError> + Send + 'static,
        T: Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || f(repo.as_ref()))
            .await
            .map_err(|e| GitError::git(format!("Read task failed: {}", e)))?
    }

    pub async fn resolve(&self, reference: &str) -> Result<Option<Oid>, GitError> {
        let reference = reference.to_string();
        self.read(move |repo| repo.resolve(&reference)).await
    }

    pub async fn commit(&self, id: &Oid) -> Result<CommitInfo, GitError> {
        let id = id.clone();
        self.read(move |repo| repo.commit(&id)).await
    }
}

impl std::fmt::Debug for GitFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitFetcher")
            .field("repository", &self.repo.path())
            .field("fetch_timeout", &self.config.fetch_timeout())
            .finish()
    }
}
