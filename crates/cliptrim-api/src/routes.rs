//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{create_clip, download_clip, get_clip_status, health};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, hide_internal_errors, rate_limit_middleware, request_logging, security_headers,
    RateLimiterCache,
};
use crate::sse::clip_events;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Only submission starts subprocesses, so only submission is rate limited
    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));
    let submit_routes = Router::new()
        .route("/clips", post(create_clip))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let api_routes = Router::new()
        .merge(submit_routes)
        .route("/clips/:task_id", get(get_clip_status))
        .route("/clips/:task_id/events", get(clip_events))
        .route("/download/:filename", get(download_clip));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health))
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn_with_state(
            state.config.is_production(),
            hide_internal_errors,
        ))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
