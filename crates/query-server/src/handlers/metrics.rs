use axum::{extract::State, response::IntoResponse};

use crate::state::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    metrics::gauge!("imgvec_index_rows").set(state.index.read().await.len() as f64);
    state.metrics.render()
}
