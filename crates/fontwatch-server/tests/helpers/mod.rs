//! Test helpers for fontwatch-server.

#![allow(dead_code, unused_imports)]

pub mod client;
pub mod source;

use std::sync::Arc;

use fontwatch_core::{JobQueue, Source};
use fontwatch_process::{ProcessEngine, Secret};
use fontwatch_server::cache::{CacheClient, CacheConfig, MemoryCache};
use fontwatch_server::metrics::detached_handle;
use fontwatch_server::service::DelayedReply;
use fontwatch_server::{AppState, ChannelSink, SourceService, create_router, review_task};
use tokio::sync::mpsc::UnboundedReceiver;

pub use client::{TestClient, TestResponse};
pub use source::{FakeSource, family};

/// A router over one fake source named `upstream`.
pub struct TestApp {
    pub client: TestClient,
    pub source: Arc<FakeSource>,
    pub replies: UnboundedReceiver<(String, DelayedReply)>,
    pub cache: Arc<MemoryCache>,
}

pub fn app() -> TestApp {
    app_with(FakeSource::new("upstream", ["Test Sans", "Other Serif"]))
}

pub fn app_with(source: FakeSource) -> TestApp {
    let source = Arc::new(source);
    let (sink, replies) = ChannelSink::new();
    let queue = JobQueue::new();
    let service =
        SourceService::new(queue.clone(), Arc::new(sink)).with_source(Arc::clone(&source) as Arc<dyn Source>);
    let reviews = ProcessEngine::builder(review_task().unwrap())
        .secret(Secret::new("test-secret"))
        .queue(queue)
        .build()
        .unwrap();

    let cache = Arc::new(MemoryCache::new(CacheConfig::default()));

    let router = create_router(
        AppState::new(service, reviews, Arc::clone(&cache) as Arc<dyn CacheClient>),
        detached_handle(),
    );
    TestApp {
        client: TestClient::new(router),
        source,
        replies,
        cache,
    }
}

/// Client over the default app.
pub fn client() -> TestClient {
    app().client
}
