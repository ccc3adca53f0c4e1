//! Prometheus recorder setup.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Buckets in seconds. Dispatches and git-backed requests take seconds,
/// health and metrics requests take microseconds.
const BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0,
];

/// Installs the global recorder and returns the handle rendering `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().set_buckets(BUCKETS)?.install_recorder()?;

    super::cache::register_cache_metrics();
    super::dispatch::register_dispatch_metrics();
    super::http::register_http_metrics();

    info!("metrics recorder installed");
    Ok(handle)
}

/// A handle whose recorder is not installed globally, for tests and for
/// routers built more than once in one process.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
