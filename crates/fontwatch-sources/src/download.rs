//! Document downloads over http(s) and from `file://` urls.

use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::error::DownloadError;

/// Redirects followed before giving up.
const MAX_REDIRECTS: usize = 7;

/// Fetches documents and font files.
///
/// Redirects are followed up to a small limit and never from `https://`
/// down to `http://`. `file://` urls are read from disk; the part after the
/// scheme is taken verbatim so relative paths work.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(timeout: Duration) -> Self {
        let policy = reqwest::redirect::Policy::custom(|attempt| {
            let redirects = attempt.previous().len();
            if redirects > MAX_REDIRECTS {
                return attempt.error(format!("too many redirects ({})", redirects));
            }
            let downgrade = attempt.url().scheme() == "http"
                && attempt.previous().last().is_some_and(|url| url.scheme() == "https");
            if downgrade {
                attempt.error("won't follow redirect that downgrades from https:// to http://")
            } else {
                attempt.follow()
            }
        });

        let client = match reqwest::Client::builder()
            .redirect(policy)
            .timeout(timeout)
            .user_agent("fontwatch")
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "falling back to the default HTTP client");
                reqwest::Client::new()
            },
        };
        Self { client }
    }

    /// Downloads the raw bytes behind `url`.
    pub async fn get(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        if let Some(path) = url.strip_prefix("file://") {
            debug!(path = %path, "reading file");
            return tokio::fs::read(path).await.map_err(|source| DownloadError::File {
                path: path.to_string(),
                source,
            });
        }

        let parsed = Url::parse(url).map_err(|_| DownloadError::UnsupportedUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::UnsupportedUrl(url.to_string()));
        }

        debug!(host = ?parsed.host_str(), path = %parsed.path(), "downloading");
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(|e| request_error(url, e))?;
        Ok(bytes.to_vec())
    }

    /// Downloads `url` and decodes it as UTF-8 (lossy).
    pub async fn get_text(&self, url: &str) -> Result<String, DownloadError> {
        let bytes = self.get(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

fn request_error(url: &str, e: reqwest::Error) -> DownloadError {
    DownloadError::Request {
        url: url.to_string(),
        reason: e.to_string(),
    }
}
