use axum::http::HeaderMap;

use crate::{error::ApiError, state::AppState};

pub fn require_token(headers: &HeaderMap, state: &AppState) -> Result<(), ApiError> {
    match &state.api_token {
        None => Ok(()),
        Some(expected) => headers
            .get("x-api-token")
            .and_then(|h| h.to_str().ok())
            .filter(|token| *token == expected.as_str())
            .map(|_| ())
            .ok_or(ApiError::Unauthorized),
    }
}
