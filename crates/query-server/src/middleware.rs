use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::info;
use uuid::Uuid;

pub const X_CORRELATION_ID: &str = "x-correlation-id";

const KNOWN_ROUTES: &[&str] = &["/health", "/metrics", "/query", "/upsert"];

/// Tags each request with a correlation id (reusing the caller's when sent),
/// then logs and meters the completed request.
pub async fn trace_with_correlation(mut req: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let correlation = req
        .headers()
        .get(X_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    let header = HeaderValue::from_str(&correlation).ok();
    if let Some(value) = header.clone() {
        req.headers_mut().insert(X_CORRELATION_ID, value);
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let mut res = next.run(req).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    if let Some(value) = header {
        res.headers_mut().insert(X_CORRELATION_ID, value);
    }

    let status = res.status().as_u16();
    let route = if KNOWN_ROUTES.contains(&path.as_str()) {
        path.clone()
    } else {
        "other".to_string()
    };
    metrics::counter!(
        "imgvec_http_requests_total",
        "route" => route.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("imgvec_http_request_duration_ms", "route" => route).record(elapsed_ms);

    info!(
        correlation_id = correlation,
        method = %method,
        path = %path,
        status,
        elapsed_ms = elapsed_ms as u64,
        "request_complete"
    );
    res
}
