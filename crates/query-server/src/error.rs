use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use search_core::SearchError;

/// Request failures, rendered as plain-text bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid JSON")]
    InvalidJson,
    #[error("Embedding size mismatch")]
    SizeMismatch,
    #[error("Empty embedding")]
    EmptyEmbedding,
    #[error("Non-finite embedding value")]
    NonFiniteEmbedding,
    #[error("Missing file")]
    MissingFile,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Failed to persist embedding")]
    Persist(anyhow::Error),
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidJson
            | Self::SizeMismatch
            | Self::EmptyEmbedding
            | Self::NonFiniteEmbedding
            | Self::MissingFile => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::DimensionMismatch { .. } => Self::SizeMismatch,
            SearchError::EmptyVector => Self::EmptyEmbedding,
            SearchError::NonFinite { .. } => Self::NonFiniteEmbedding,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Persist(source) = &self {
            tracing::error!(error = %format!("{source:#}"), "upsert persistence failed");
        }
        (self.status(), self.to_string()).into_response()
    }
}
