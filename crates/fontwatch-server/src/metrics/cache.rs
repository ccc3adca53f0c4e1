//! Bundle cache metrics.

use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Describes the cache metrics. Call once at startup.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "fontwatch_cache_puts_total",
        "Bundles written to the cache, labelled by whether they were new"
    );
    metrics::describe_counter!("fontwatch_cache_hits_total", "Bundle lookups that found the bundle");
    metrics::describe_counter!("fontwatch_cache_misses_total", "Bundle lookups that missed");
    metrics::describe_gauge!("fontwatch_cache_entries", "Bundles currently held in the cache");
    metrics::describe_histogram!("fontwatch_cache_operation_seconds", "Time spent on cache operations");
}

/// Cache metrics recorder.
///
/// Keeps local counters next to the exported ones so tests and logs can
/// read them without a recorder installed.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    stored: Arc<AtomicU64>,
    duplicates: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a put; `fresh` is false when the bundle was already cached.
    pub fn record_put(&self, fresh: bool) {
        let (local, outcome) = if fresh {
            (&self.stored, "stored")
        } else {
            (&self.duplicates, "duplicate")
        };
        local.fetch_add(1, Ordering::Relaxed);
        counter!("fontwatch_cache_puts_total", "outcome" => outcome).increment(1);
    }

    pub fn record_lookup(&self, hit: bool) {
        if hit {
            counter!("fontwatch_cache_hits_total").increment(1);
        } else {
            counter!("fontwatch_cache_misses_total").increment(1);
        }
    }

    pub fn update_entry_count(&self, count: u64) {
        gauge!("fontwatch_cache_entries").set(count as f64);
    }

    pub fn record_operation_duration(&self, operation: &'static str, duration: Duration) {
        histogram!("fontwatch_cache_operation_seconds", "operation" => operation).record(duration.as_secs_f64());
    }

    /// Bundles stored for the first time.
    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    /// Puts of bundles that were already cached.
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_counters() {
        let metrics = CacheMetrics::new();
        metrics.record_put(true);
        metrics.record_put(false);
        metrics.record_put(false);

        assert_eq!(metrics.stored(), 1);
        assert_eq!(metrics.duplicates(), 2);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = CacheMetrics::new();
        let clone = metrics.clone();
        clone.record_put(true);
        assert_eq!(metrics.stored(), 1);
    }
}
