//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder and return its render handle.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "fswap_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "fswap_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "fswap_http_requests_in_flight";

    pub const UPLOADS_TOTAL: &str = "fswap_uploads_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "fswap_upload_bytes_total";
    pub const SSE_CONNECTIONS_ACTIVE: &str = "fswap_sse_connections_active";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record one saved upload.
pub fn record_upload(field: &str, bytes: u64) {
    let labels = [("field", field.to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes);
}

pub fn sse_connected() {
    gauge!(names::SSE_CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn sse_disconnected() {
    gauge!(names::SSE_CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Collapse file paths and job ids so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut segments = path.trim_start_matches('/').split('/');
    match segments.next() {
        Some(root @ ("download" | "preview")) => format!("/{}/:path", root),
        Some("jobs") => match (segments.next(), segments.next()) {
            (Some(_), Some(action)) => format!("/jobs/:job_id/{}", action),
            (Some(_), None) => "/jobs/:job_id".to_string(),
            _ => "/jobs".to_string(),
        },
        _ => path.to_string(),
    }
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
