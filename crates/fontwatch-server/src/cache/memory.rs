//! In-process bundle cache on Moka.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fontwatch_core::CacheKey;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CacheClient, CacheError, content_key};
use crate::metrics::CacheMetrics;

/// Cache bounds. Both are off by default: a bundle stays until every
/// reference to it has been purged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Upper bound on stored bytes. Bundles past it are evicted even if
    /// a job still names them.
    #[serde(default)]
    pub max_bytes: Option<u64>,

    /// Expiry for bundles nobody purged.
    #[serde(default, with = "optional_secs")]
    pub ttl: Option<Duration>,
}

/// A stored bundle and the number of puts not yet purged.
#[derive(Debug, Clone)]
struct CachedBundle {
    data: Arc<Vec<u8>>,
    instances: u64,
}

mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

/// Write-once, reference-counted bundle cache.
///
/// Every put of the same content adds one instance; [`CacheClient::purge`]
/// removes one and drops the bundle when none are left.
///
/// ```no_run
/// use fontwatch_server::cache::{CacheClient, CacheConfig, MemoryCache};
///
/// # #[tokio::main]
/// # async fn main() {
/// let cache = MemoryCache::new(CacheConfig::default());
/// let key = cache.put(b"bundle".to_vec()).await.unwrap();
/// assert!(cache.get(&key).await.unwrap().is_some());
/// assert_eq!(cache.purge(&key, false).await.unwrap(), 0);
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<CacheKey, CachedBundle>,
    metrics: CacheMetrics,
}

impl MemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        let mut builder = Cache::builder();
        if let Some(max_bytes) = config.max_bytes {
            builder = builder
                .max_capacity(max_bytes)
                .weigher(|_key: &CacheKey, value: &CachedBundle| u32::try_from(value.data.len()).unwrap_or(u32::MAX));
        }
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            inner: builder.build(),
            metrics: CacheMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Approximate number of cached bundles.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Flushes pending maintenance so counts are exact (tests mainly).
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn put(&self, bundle: Vec<u8>) -> Result<CacheKey, CacheError> {
        let start = Instant::now();
        let key = content_key(&bundle);
        let size = bundle.len();

        let result = self
            .inner
            .entry(key.clone())
            .and_compute_with(move |entry| {
                let bundle = match entry {
                    Some(entry) => {
                        let mut existing = entry.into_value();
                        existing.instances += 1;
                        existing
                    },
                    None => CachedBundle {
                        data: Arc::new(bundle),
                        instances: 1,
                    },
                };
                std::future::ready(Op::Put(bundle))
            })
            .await;
        let fresh = matches!(result, CompResult::Inserted(_));

        self.metrics.record_put(fresh);
        self.metrics.record_operation_duration("put", start.elapsed());
        self.metrics.update_entry_count(self.inner.entry_count());
        debug!(key = %key, size, fresh, "bundle cached");
        Ok(key)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        let start = Instant::now();
        let value = self.inner.get(key).await.map(|bundle| bundle.data);
        self.metrics.record_lookup(value.is_some());
        self.metrics.record_operation_duration("get", start.elapsed());
        Ok(value)
    }

    async fn purge(&self, key: &CacheKey, force: bool) -> Result<u64, CacheError> {
        let start = Instant::now();
        let result = self
            .inner
            .entry(key.clone())
            .and_compute_with(move |entry| {
                let op = match entry {
                    None => Op::Nop,
                    Some(_) if force => Op::Remove,
                    Some(entry) => {
                        let mut bundle = entry.into_value();
                        bundle.instances = bundle.instances.saturating_sub(1);
                        if bundle.instances == 0 { Op::Remove } else { Op::Put(bundle) }
                    },
                };
                std::future::ready(op)
            })
            .await;
        let remaining = match result {
            CompResult::ReplacedWith(entry) => entry.value().instances,
            _ => 0,
        };

        self.metrics.record_operation_duration("purge", start.elapsed());
        self.metrics.update_entry_count(self.inner.entry_count());
        debug!(key = %key, force, remaining, "bundle purged");
        Ok(remaining)
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.inner.entry_count())
            .field("weighted_size", &self.inner.weighted_size())
            .finish()
    }
}
