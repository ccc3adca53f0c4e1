//! Metrics exported at `/metrics`.

pub mod cache;
pub mod dispatch;
pub mod http;
pub mod setup;

pub use cache::CacheMetrics;
pub use setup::{detached_handle, init_metrics};
