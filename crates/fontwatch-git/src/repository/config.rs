//! Fetch configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::repository::repository_directory;

/// Configuration shared by every git-backed source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchConfig {
    /// Directory holding one bare mirror per remote URL.
    repositories_dir: PathBuf,

    /// Reference used when a source names none.
    #[serde(default = "default_reference")]
    default_reference: String,

    /// Deadline for a single fetch.
    #[serde(default = "default_fetch_timeout", with = "fontwatch_core::serde_secs")]
    fetch_timeout: Duration,

    /// Whether an existing remote may be re-pointed at a new URL.
    #[serde(default)]
    allow_remote_update: bool,

    /// Families materialized and dispatched concurrently in one pass.
    #[serde(default = "default_max_parallel_families")]
    max_parallel_families: usize,
}

fn default_reference() -> String {
    "main".to_string()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_max_parallel_families() -> usize {
    4
}

impl FetchConfig {
    /// Creates a new builder for FetchConfig.
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::default()
    }

    pub fn repositories_dir(&self) -> &Path {
        &self.repositories_dir
    }

    /// Local mirror path for a remote URL.
    pub fn repository_path(&self, url: &str) -> PathBuf {
        self.repositories_dir.join(repository_directory(url))
    }

    pub fn default_reference(&self) -> &str {
        &self.default_reference
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn allow_remote_update(&self) -> bool {
        self.allow_remote_update
    }

    pub fn max_parallel_families(&self) -> usize {
        self.max_parallel_families
    }
}

/// Builder for FetchConfig.
#[derive(Debug, Default)]
pub struct FetchConfigBuilder {
    repositories_dir: Option<PathBuf>,
    default_reference: Option<String>,
    fetch_timeout: Option<Duration>,
    allow_remote_update: bool,
    max_parallel_families: Option<usize>,
}

impl FetchConfigBuilder {
    pub fn repositories_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.repositories_dir = Some(path.into());
        self
    }

    pub fn default_reference(mut self, reference: impl Into<String>) -> Self {
        self.default_reference = Some(reference.into());
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn allow_remote_update(mut self, allow: bool) -> Self {
        self.allow_remote_update = allow;
        self
    }

    pub fn max_parallel_families(mut self, workers: usize) -> Self {
        self.max_parallel_families = Some(workers);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<FetchConfig, &'static str> {
        let repositories_dir = self.repositories_dir.ok_or("repositories_dir is required")?;

        Ok(FetchConfig {
            repositories_dir,
            default_reference: self.default_reference.unwrap_or_else(default_reference),
            fetch_timeout: self.fetch_timeout.unwrap_or_else(default_fetch_timeout),
            allow_remote_update: self.allow_remote_update,
            max_parallel_families: self
                .max_parallel_families
                .unwrap_or_else(default_max_parallel_families),
        })
    }
}
