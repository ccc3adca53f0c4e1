//! Dispatch pipeline: bundle, cache, publish.
//!
//! A detected family is encoded into a deterministic MessagePack bundle
//! (files sorted by name), stored in the content-addressed cache and
//! announced with one [`DispatchJob`]. Cache writes are serialized on the
//! job queue under [`CACHE_QUEUE_KEY`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use fontwatch_core::{
    CacheKey, DispatchJob, FamilyDescriptor, FamilyDispatcher, JobQueue, Result, SourceError, flatten,
};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{info, warn};

use crate::cache::CacheClient;
use crate::metrics::dispatch as dispatch_metrics;
use crate::publish::{JOB_QUEUE, JobPublisher};

/// Queue key every cache write runs under.
pub const CACHE_QUEUE_KEY: &str = "cache";

/// Dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Prefix of every collection id.
    #[serde(default = "default_server_id")]
    pub server_id: String,

    #[serde(default = "default_job_queue")]
    pub job_queue: String,
}

fn default_server_id() -> String {
    "fontwatch".to_string()
}

fn default_job_queue() -> String {
    JOB_QUEUE.to_string()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            server_id: default_server_id(),
            job_queue: default_job_queue(),
        }
    }
}

struct Bytes<'a>(&'a [u8]);

impl Serialize for Bytes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

/// Encodes the files of `family` as a MessagePack array of
/// `[name, bytes]` pairs ordered by name.
pub fn encode_bundle(family: &FamilyDescriptor) -> Result<Vec<u8>> {
    let files: Vec<(&str, Bytes<'_>)> = family
        .sorted_files()
        .into_iter()
        .map(|file| (file.name.as_str(), Bytes(&file.data)))
        .collect();
    rmp_serde::to_vec(&files).map_err(|e| SourceError::dispatch(format!("can't encode bundle: {e}")))
}

/// [`FamilyDispatcher`] writing to a [`CacheClient`] and a [`JobPublisher`].
#[derive(Clone)]
pub struct Dispatcher {
    config: DispatchConfig,
    cache: Arc<dyn CacheClient>,
    publisher: Arc<dyn JobPublisher>,
    queue: JobQueue,
}

impl Dispatcher {
    pub fn new(
        config: DispatchConfig,
        cache: Arc<dyn CacheClient>,
        publisher: Arc<dyn JobPublisher>,
        queue: JobQueue,
    ) -> Self {
        Self {
            config,
            cache,
            publisher,
            queue,
        }
    }

    async fn cache_bundle(&self, bundle: Vec<u8>) -> Result<CacheKey> {
        let cache = Arc::clone(&self.cache);
        let stored = self
            .queue
            .schedule(CACHE_QUEUE_KEY, move || async move {
                cache
                    .put(bundle)
                    .await
                    .map_err(|e| SourceError::dispatch(e.to_string()))
            })
            .await;
        flatten(stored)
    }
}

#[async_trait]
impl FamilyDispatcher for Dispatcher {
    async fn dispatch(&self, source_id: &str, family: FamilyDescriptor) -> Result<CacheKey> {
        let start = Instant::now();
        let bundle = encode_bundle(&family)?;

        let cache_key = self.cache_bundle(bundle).await.inspect_err(|e| {
            warn!(source = source_id, family = %family.family_name, error = %e, "can't cache bundle");
            dispatch_metrics::record_failure(source_id, "cache");
        })?;

        let metadata = serde_json::to_value(&family.metadata)
            .map_err(|e| SourceError::dispatch(format!("can't encode metadata: {e}")))?;
        let job = DispatchJob {
            collection_id: DispatchJob::collection_id(&self.config.server_id, source_id),
            family_name: family.family_name.clone(),
            cache_key: cache_key.clone(),
            timestamp: Utc::now(),
            metadata,
        };
        if let Err(e) = self.publisher.publish(&self.config.job_queue, &job).await {
            dispatch_metrics::record_failure(source_id, "publish");
            return Err(SourceError::dispatch(e.to_string()));
        }

        dispatch_metrics::record_dispatched(source_id, start.elapsed());
        info!(
            source = source_id,
            family = %family.family_name,
            cache_key = %cache_key,
            commit = %family.metadata.commit,
            "family dispatched"
        );
        Ok(cache_key)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("config", &self.config).finish()
    }
}
