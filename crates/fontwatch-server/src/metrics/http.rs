//! HTTP metrics middleware.

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use std::time::Instant;

/// Records count and latency of every request, labelled by route template.
pub async fn http_metrics_middleware(matched_path: Option<MatchedPath>, request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    // Unmatched requests share one label so arbitrary paths can't explode cardinality.
    let path = matched_path.map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let response = next.run(request).await;
    let status = response.status().as_u16().to_string();

    counter!(
        "fontwatch_http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "fontwatch_http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

pub fn register_http_metrics() {
    metrics::describe_counter!("fontwatch_http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "fontwatch_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
}
