use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration of the web fonts API source.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSourceConfig {
    /// Document url; usually carries the API key as `key=` query parameter.
    data_url: String,

    /// Font downloads running at once across all families.
    #[serde(default = "default_max_parallel_downloads")]
    max_parallel_downloads: usize,

    #[serde(default = "default_download_timeout", with = "fontwatch_core::serde_secs")]
    download_timeout: Duration,
}

fn default_max_parallel_downloads() -> usize {
    4
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(60)
}

impl ApiSourceConfig {
    pub fn new(data_url: impl Into<String>) -> Self {
        Self {
            data_url: data_url.into(),
            max_parallel_downloads: default_max_parallel_downloads(),
            download_timeout: default_download_timeout(),
        }
    }

    /// Builds the production url from an API key.
    pub fn with_api_key(api_key: &str) -> Self {
        Self::new(format!("https://www.googleapis.com/webfonts/v1/webfonts?key={api_key}"))
    }

    pub fn max_parallel_downloads(mut self, workers: usize) -> Self {
        self.max_parallel_downloads = workers;
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn parallel_downloads(&self) -> usize {
        self.max_parallel_downloads
    }

    pub fn timeout(&self) -> Duration {
        self.download_timeout
    }

    /// The data url without its `key` parameter, safe to log and publish.
    pub fn public_url(&self) -> String {
        redact_api_key(&self.data_url)
    }
}

impl std::fmt::Debug for ApiSourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSourceConfig")
            .field("data_url", &self.public_url())
            .field("max_parallel_downloads", &self.max_parallel_downloads)
            .field("download_timeout", &self.download_timeout)
            .finish()
    }
}

fn redact_api_key(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if !url.query_pairs().any(|(name, _)| name == "key") {
        return raw.to_string();
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != "key")
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}
