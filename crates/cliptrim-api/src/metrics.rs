//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "cliptrim_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "cliptrim_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "cliptrim_http_requests_in_flight";

    // Progress streams
    pub const PROGRESS_STREAMS_TOTAL: &str = "cliptrim_progress_streams_total";
    pub const PROGRESS_STREAMS_ACTIVE: &str = "cliptrim_progress_streams_active";

    // Artifact delivery
    pub const DOWNLOADS_SERVED_TOTAL: &str = "cliptrim_downloads_served_total";

    // Rate limiting
    pub const RATE_LIMIT_HITS_TOTAL: &str = "cliptrim_rate_limit_hits_total";
}

static HEX_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/[0-9a-f]{32}(/|$)").expect("valid id regex"));
static DOWNLOAD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/download/[^/]+").expect("valid download regex"));

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_stream_opened() {
    counter!(names::PROGRESS_STREAMS_TOTAL).increment(1);
    gauge!(names::PROGRESS_STREAMS_ACTIVE).increment(1.0);
}

pub fn record_stream_closed() {
    gauge!(names::PROGRESS_STREAMS_ACTIVE).decrement(1.0);
}

pub fn record_download_served(extension: &str) {
    let labels = [("extension", extension.to_string())];
    counter!(names::DOWNLOADS_SERVED_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Replace task ids and file names so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let path = HEX_ID.replace_all(path, "/:task_id$1");
    DOWNLOAD_NAME
        .replace_all(&path, "/download/:filename")
        .to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/clips/0123456789abcdef0123456789abcdef/events"),
            "/api/clips/:task_id/events"
        );
        assert_eq!(
            sanitize_path("/api/clips/0123456789abcdef0123456789abcdef"),
            "/api/clips/:task_id"
        );
        assert_eq!(
            sanitize_path("/api/download/My Clip_0123.mp4"),
            "/api/download/:filename"
        );
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
