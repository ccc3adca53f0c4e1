//! Dispatch pipeline metrics.

use std::time::Duration;

use metrics::{counter, histogram};

/// Describes the dispatch metrics.
pub fn register_dispatch_metrics() {
    metrics::describe_counter!(
        "fontwatch_families_dispatched_total",
        "Families cached and published, by source"
    );
    metrics::describe_counter!(
        "fontwatch_dispatch_failures_total",
        "Families whose caching or publishing failed, by source and stage"
    );
    metrics::describe_histogram!("fontwatch_dispatch_seconds", "Time from bundle encoding to publish");
    metrics::describe_counter!("fontwatch_source_updates_total", "Source update passes, by source and result");
}

pub fn record_dispatched(source_id: &str, elapsed: Duration) {
    counter!("fontwatch_families_dispatched_total", "source" => source_id.to_string()).increment(1);
    histogram!("fontwatch_dispatch_seconds", "source" => source_id.to_string()).record(elapsed.as_secs_f64());
}

pub fn record_failure(source_id: &str, stage: &'static str) {
    counter!(
        "fontwatch_dispatch_failures_total",
        "source" => source_id.to_string(),
        "stage" => stage
    )
    .increment(1);
}

pub fn record_update(source_id: &str, ok: bool) {
    let result = if ok { "ok" } else { "failed" };
    counter!(
        "fontwatch_source_updates_total",
        "source" => source_id.to_string(),
        "result" => result
    )
    .increment(1);
}
