use std::time::Instant;

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use common::{QueryMatch, QueryRequest, QueryResponse};

use crate::{error::ApiError, handlers::auth::require_token, state::AppState};

pub async fn query_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<QueryResponse>, ApiError> {
    require_token(&headers, &state)?;
    let request =
        serde_json::from_slice::<QueryRequest>(&body).map_err(|_| ApiError::InvalidJson)?;

    let metric = request.metric.unwrap_or_default();
    let top_k = state.retrieval.resolve_top_k(request.top_k);
    let started = Instant::now();
    let hits = {
        let index = state.index.read().await;
        index.search(&request.embedding, top_k, metric)?
    };
    metrics::counter!("imgvec_queries_total").increment(1);
    metrics::histogram!("imgvec_query_latency_ms").record(started.elapsed().as_secs_f64() * 1000.0);

    Ok(Json(QueryResponse {
        matches: hits
            .into_iter()
            .map(|hit| QueryMatch::scored(metric, hit.file, hit.score))
            .collect(),
    }))
}
