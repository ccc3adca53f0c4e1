//! Destinations of delayed family replies.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fontwatch_core::{CacheKey, FamilyDescriptor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};

use crate::cache::{CacheClient, CacheError};
use crate::dispatch::encode_bundle;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("reply target '{0}' is closed")]
    Closed(String),

    #[error("invalid reply target '{0}'")]
    InvalidTarget(String),

    #[error("can't write reply to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't encode reply: {0}")]
    Encode(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result of one delayed `get`, on its way to the requester.
#[derive(Debug, Clone)]
pub struct DelayedReply {
    pub source_id: String,
    pub family_name: String,
    pub result: Result<FamilyDescriptor, String>,
}

/// Receives delayed replies addressed to a named target.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn deliver(&self, target: &str, reply: DelayedReply) -> Result<(), SinkError>;
}

/// Whether `target` is usable as a reply address: non-empty ASCII
/// alphanumerics, `-`, `_` and `.`, not starting with a dot.
pub fn is_valid_target(target: &str) -> bool {
    !target.is_empty()
        && !target.starts_with('.')
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Hands replies to an in-process receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(String, DelayedReply)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, DelayedReply)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    async fn deliver(&self, target: &str, reply: DelayedReply) -> Result<(), SinkError> {
        self.tx
            .send((target.to_string(), reply))
            .map_err(|_| SinkError::Closed(target.to_string()))
    }
}

/// Line written by [`CacheSink`] for every reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRecord {
    pub target: String,
    pub source_id: String,
    pub family_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<CacheKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub delivered: DateTime<Utc>,
}

/// Stores the family bundle in the cache and appends a [`ReplyRecord`]
/// naming its key to `<dir>/<target>.jsonl`.
pub struct CacheSink {
    cache: Arc<dyn CacheClient>,
    dir: PathBuf,
    write: Mutex<()>,
}

impl CacheSink {
    pub fn new(cache: Arc<dyn CacheClient>, dir: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            dir: dir.into(),
            write: Mutex::new(()),
        }
    }

    pub fn target_path(&self, target: &str) -> PathBuf {
        self.dir.join(format!("{target}.jsonl"))
    }
}

#[async_trait]
impl ResponseSink for CacheSink {
    async fn deliver(&self, target: &str, reply: DelayedReply) -> Result<(), SinkError> {
        if !is_valid_target(target) {
            return Err(SinkError::InvalidTarget(target.to_string()));
        }

        let (cache_key, error) = match reply.result {
            Ok(family) => {
                let bundle = encode_bundle(&family).map_err(|e| SinkError::Encode(e.to_string()))?;
                (Some(self.cache.put(bundle).await?), None)
            },
            Err(message) => (None, Some(message)),
        };
        let record = ReplyRecord {
            target: target.to_string(),
            source_id: reply.source_id,
            family_name: reply.family_name,
            cache_key,
            error,
            delivered: Utc::now(),
        };
        let mut line = serde_json::to_vec(&record).map_err(|e| SinkError::Encode(e.to_string()))?;
        line.push(b'\n');

        let path = self.target_path(target);
        let io = |source| SinkError::Io {
            path: path.clone(),
            source,
        };
        let _guard = self.write.lock().await;
        tokio::fs::create_dir_all(&self.dir).await.map_err(io)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io)?;
        file.write_all(&line).await.map_err(io)?;
        file.sync_data().await.map_err(io)
    }
}

impl std::fmt::Debug for CacheSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSink").field("dir", &self.dir).finish()
    }
}
