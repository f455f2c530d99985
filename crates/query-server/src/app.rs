use axum::middleware;
use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{
    health::health, metrics::metrics_handler, query::query_handler, upsert::upsert_handler,
};
use crate::middleware::trace_with_correlation;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/query", post(query_handler))
        .route("/upsert", post(upsert_handler))
        .layer(middleware::from_fn(trace_with_correlation))
        .with_state(state)
}
