pub mod retrieval;
pub mod vector;

pub use retrieval::RetrievalDefaults;
pub use vector::{EmbeddingIndex, ScoredPath};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("embedding size mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding is empty")]
    EmptyVector,
    #[error("embedding has a non-finite value at {index}")]
    NonFinite { index: usize },
}
