use std::net::SocketAddr;

use axum::{
    Router,
    body::Body,
    middleware,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, info, warn};

use crate::handlers::{cache, health, metrics, processes, sources};
use crate::middleware::{MakeRequestUuid, REQUEST_ID_HEADER, request_span};
use crate::state::AppState;

/// Creates the router with the given application state and metrics handle.
pub fn create_router(state: AppState, prometheus_handle: PrometheusHandle) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER.clone(), MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span::<Body>)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER.clone()));

    let metrics_router = Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(prometheus_handle);

    let app_router = Router::new()
        .route("/health", get(health::health_check))
        .route("/sources/poke", post(sources::poke))
        .route("/sources/{source}/families", get(sources::list_families))
        .route("/sources/{source}/families/{family}", get(sources::get_family))
        .route("/sources/{source}/families/{family}/details", get(sources::family_details))
        .route("/sources/{source}/families/{family}/delayed", post(sources::get_delayed))
        .route("/cache/{key}", get(cache::get_bundle).delete(cache::purge_bundle))
        .route("/processes", post(processes::create_process))
        .route("/processes/{id}", get(processes::get_process))
        .route("/processes/{id}/execute", post(processes::execute))
        .with_state(state);

    Router::new()
        .merge(app_router)
        .merge(metrics_router)
        .layer(middleware::from_fn(crate::metrics::http::http_metrics_middleware))
        .layer(middleware_stack)
}

/// Serves until SIGINT or SIGTERM.
pub async fn run_server(
    addr: SocketAddr,
    state: AppState,
    prometheus_handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = create_router(state, prometheus_handle);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "can't listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "can't listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
