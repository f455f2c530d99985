#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalDefaults {
    pub top_k: usize,
    pub max_top_k: usize,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_top_k: 100,
        }
    }
}

impl RetrievalDefaults {
    pub fn with_top_k(top_k: usize) -> Self {
        Self {
            top_k: top_k.max(1),
            ..Self::default()
        }
    }

    /// Requested count, falling back to the default and clamped to `1..=max_top_k`.
    pub fn resolve_top_k(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.top_k)
            .clamp(1, self.max_top_k.max(1))
    }
}
