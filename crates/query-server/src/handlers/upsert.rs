use anyhow::Context;
use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use common::{UpsertRequest, UpsertResponse};
use tracing::{debug, info};

use crate::{error::ApiError, handlers::auth::require_token, state::AppState};

pub async fn upsert_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UpsertResponse>, ApiError> {
    require_token(&headers, &state)?;
    let request =
        serde_json::from_slice::<UpsertRequest>(&body).map_err(|_| ApiError::InvalidJson)?;
    if request.file.trim().is_empty() {
        return Err(ApiError::MissingFile);
    }

    // Only upserts mutate the index, so validating under the read lock stays
    // accurate until the write below while this guard is held.
    let _serialized = state.upserts.lock().await;
    state.index.read().await.validate(&request.embedding)?;

    // Disk first, so a failed write leaves memory and disk in agreement.
    if state.persist_upserts {
        match state.persist_target(&request.file) {
            Some(target) => {
                let embedding = request.embedding.clone();
                tokio::task::spawn_blocking(move || indexer::save_embedding(&target, &embedding))
                    .await
                    .context("persist task failed")
                    .and_then(|written| written)
                    .map_err(ApiError::Persist)?;
            }
            None => debug!(file = %request.file, "upsert target outside embedding dir, kept in memory only"),
        }
    }

    let (inserted, total) = {
        let mut index = state.index.write().await;
        let inserted = index.upsert(request.file.clone(), &request.embedding)?;
        (inserted, index.len())
    };

    metrics::counter!("imgvec_upserts_total", "kind" => if inserted { "insert" } else { "replace" })
        .increment(1);
    info!(file = %request.file, inserted, total, "upserted embedding");

    Ok(Json(UpsertResponse {
        file: request.file,
        inserted,
        total,
    }))
}
