//! Time-bounded cache for the parsed catalog sheet.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::CsvData;
use crate::error::CsvError;

struct CachedSheet {
    fetched_at: Instant,
    data: Arc<CsvData>,
}

/// Holds the last parsed sheet for `ttl`.
///
/// Loads are serialized: a caller arriving while a download is running waits
/// for it and reuses its result instead of starting a second one. A failed
/// download clears the cache.
pub struct CsvCache {
    ttl: Duration,
    entry: Mutex<Option<CachedSheet>>,
}

impl CsvCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached sheet if it is fresh and `force` is unset,
    /// otherwise runs `fetch` and caches its result.
    pub async fn load<F, Fut>(&self, force: bool, fetch: F) -> Result<Arc<CsvData>, CsvError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CsvData, CsvError>>,
    {
        let requested = Instant::now();
        let mut entry = self.entry.lock().await;

        if let Some(cached) = entry.as_ref() {
            // A download that finished while we waited counts as forced.
            let fresh = cached.fetched_at.elapsed() < self.ttl;
            if (!force && fresh) || cached.fetched_at > requested {
                debug!(age_ms = cached.fetched_at.elapsed().as_millis() as u64, "using cached sheet");
                return Ok(Arc::clone(&cached.data));
            }
        }

        match fetch().await {
            Ok(data) => {
                let data = Arc::new(data);
                *entry = Some(CachedSheet {
                    fetched_at: Instant::now(),
                    data: Arc::clone(&data),
                });
                Ok(data)
            },
            Err(e) => {
                *entry = None;
                Err(e)
            },
        }
    }

    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}

impl std::fmt::Debug for CsvCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvCache").field("ttl", &self.ttl).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SHEET: &str = "Status,family,family name is confirmed as good?,upstream,fontfiles prefix,genre\n\
                         OK,Alpha,Passed,https://github.com/a/alpha,Alpha-,Serif";

    async fn load(cache: &CsvCache, force: bool, downloads: &AtomicUsize) -> Result<Arc<CsvData>, CsvError> {
        cache
            .load(force, || async {
                downloads.fetch_add(1, Ordering::SeqCst);
                CsvData::parse(SHEET)
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_and_force() {
        let cache = CsvCache::new(Duration::from_secs(300));
        let downloads = AtomicUsize::new(0);

        load(&cache, false, &downloads).await.unwrap();
        load(&cache, false, &downloads).await.unwrap();
        assert_eq!(downloads.load(Ordering::SeqCst), 1);

        load(&cache, true, &downloads).await.unwrap();
        assert_eq!(downloads.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(301)).await;
        load(&cache, false, &downloads).await.unwrap();
        assert_eq!(downloads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_clears_cache() {
        let cache = CsvCache::new(Duration::from_secs(300));
        let downloads = AtomicUsize::new(0);
        load(&cache, false, &downloads).await.unwrap();

        let err = cache.load(true, || async { Err(CsvError::Empty) }).await.unwrap_err();
        assert!(matches!(err, CsvError::Empty));

        load(&cache, false, &downloads).await.unwrap();
        assert_eq!(downloads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_download() {
        let cache = Arc::new(CsvCache::new(Duration::from_secs(300)));
        let downloads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let downloads = Arc::clone(&downloads);
                tokio::spawn(async move {
                    cache
                        .load(true, || async move {
                            downloads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            CsvData::parse(SHEET)
                        })
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // The first forced load downloads; the ones queued behind it reuse it.
        assert_eq!(downloads.load(Ordering::SeqCst), 1);
    }
}
