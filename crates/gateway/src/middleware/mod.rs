//! HTTP middleware

use axum::{extract::Request, middleware::Next, response::Response};
use reviewlens_common::metrics::RequestMetrics;

/// Record request count and latency per route
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();

    let metrics = RequestMetrics::start(&method, &endpoint);
    let response = next.run(request).await;
    metrics.finish(response.status().as_u16());

    response
}
