//! Application state.

use std::sync::Arc;

use crate::cache::CacheClient;
use crate::review::ReviewEngine;
use crate::service::SourceService;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    service: SourceService,
    reviews: ReviewEngine,
    cache: Arc<dyn CacheClient>,
}

impl AppState {
    pub fn new(service: SourceService, reviews: ReviewEngine, cache: Arc<dyn CacheClient>) -> Self {
        Self {
            service,
            reviews,
            cache,
        }
    }

    pub fn service(&self) -> &SourceService {
        &self.service
    }

    pub fn reviews(&self) -> &ReviewEngine {
        &self.reviews
    }

    pub fn cache(&self) -> &Arc<dyn CacheClient> {
        &self.cache
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service", &self.service)
            .field("reviews", &self.reviews)
            .finish_non_exhaustive()
    }
}
