//! CSV source configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::metadata::MetadataTool;

/// Configuration of one CSV-driven source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvSourceConfig {
    /// `http(s)://` or `file://` url of the catalog sheet.
    sheet_url: String,

    /// How long a downloaded sheet is reused by `list`/`get`.
    #[serde(default = "default_cache_ttl", with = "fontwatch_core::serde_secs")]
    cache_ttl: Duration,

    /// Upstream fetches running at once; upstream hosts tolerate little load.
    #[serde(default = "default_max_parallel_fetches")]
    max_parallel_fetches: usize,

    /// Deadline for downloading the sheet.
    #[serde(default = "default_download_timeout", with = "fontwatch_core::serde_secs")]
    download_timeout: Duration,

    /// Catalog whose family directories decide `is_update` and supply
    /// ancillary files.
    #[serde(default = "default_reference_url")]
    reference_url: String,

    #[serde(default = "default_reference_remote")]
    reference_remote: String,

    #[serde(default = "default_reference_branch")]
    reference_branch: String,

    #[serde(default)]
    metadata_tool: Option<MetadataTool>,
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_max_parallel_fetches() -> usize {
    1
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_reference_url() -> String {
    "https://github.com/google/fonts.git".to_string()
}

fn default_reference_remote() -> String {
    "google/fonts".to_string()
}

fn default_reference_branch() -> String {
    "main".to_string()
}

impl CsvSourceConfig {
    pub fn builder() -> CsvSourceConfigBuilder {
        CsvSourceConfigBuilder::default()
    }

    pub fn sheet_url(&self) -> &str {
        &self.sheet_url
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn max_parallel_fetches(&self) -> usize {
        self.max_parallel_fetches
    }

    pub fn download_timeout(&self) -> Duration {
        self.download_timeout
    }

    pub fn reference_url(&self) -> &str {
        &self.reference_url
    }

    pub fn reference_remote(&self) -> &str {
        &self.reference_remote
    }

    pub fn reference_branch(&self) -> &str {
        &self.reference_branch
    }

    pub fn metadata_tool(&self) -> Option<&MetadataTool> {
        self.metadata_tool.as_ref()
    }
}

/// Builder for CsvSourceConfig.
#[derive(Debug, Default)]
pub struct CsvSourceConfigBuilder {
    sheet_url: Option<String>,
    cache_ttl: Option<Duration>,
    max_parallel_fetches: Option<usize>,
    download_timeout: Option<Duration>,
    reference: Option<(String, String, String)>,
    metadata_tool: Option<MetadataTool>,
}

impl CsvSourceConfigBuilder {
    pub fn sheet_url(mut self, url: impl Into<String>) -> Self {
        self.sheet_url = Some(url.into());
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn max_parallel_fetches(mut self, workers: usize) -> Self {
        self.max_parallel_fetches = Some(workers);
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = Some(timeout);
        self
    }

    /// Overrides the reference catalog (url, remote name, branch).
    pub fn reference(mut self, url: impl Into<String>, remote: impl Into<String>, branch: impl Into<String>) -> Self {
        self.reference = Some((url.into(), remote.into(), branch.into()));
        self
    }

    pub fn metadata_tool(mut self, tool: MetadataTool) -> Self {
        self.metadata_tool = Some(tool);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the sheet url is missing.
    pub fn build(self) -> Result<CsvSourceConfig, &'static str> {
        let sheet_url = self.sheet_url.ok_or("sheet_url is required")?;
        let (reference_url, reference_remote, reference_branch) = self.reference.unwrap_or_else(|| {
            (
                default_reference_url(),
                default_reference_remote(),
                default_reference_branch(),
            )
        });

        Ok(CsvSourceConfig {
            sheet_url,
            cache_ttl: self.cache_ttl.unwrap_or_else(default_cache_ttl),
            max_parallel_fetches: self
                .max_parallel_fetches
                .unwrap_or_else(default_max_parallel_fetches),
            download_timeout: self.download_timeout.unwrap_or_else(default_download_timeout),
            reference_url,
            reference_remote,
            reference_branch,
            metadata_tool: self.metadata_tool,
        })
    }
}
