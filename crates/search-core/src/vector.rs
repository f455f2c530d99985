use std::cmp::Ordering;

use ahash::AHashMap;
use common::Metric;
use tracing::debug;

use crate::SearchError;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPath {
    pub file: String,
    pub score: f32,
}

/// Dense in-memory matrix of embeddings keyed by file path.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    dim: Option<usize>,
    paths: Vec<String>,
    rows: Vec<f32>,
    by_path: AHashMap<String, usize>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from row-major data; rows beyond `paths.len()` are ignored.
    pub fn from_set(
        dim: Option<usize>,
        paths: Vec<String>,
        data: &[f32],
    ) -> Result<Self, SearchError> {
        let mut index = Self::new();
        let Some(dim) = dim else {
            return Ok(index);
        };
        if data.len() < paths.len() * dim {
            return Err(SearchError::DimensionMismatch {
                expected: paths.len() * dim,
                actual: data.len(),
            });
        }
        for (row, path) in paths.into_iter().enumerate() {
            index.upsert(path, &data[row * dim..(row + 1) * dim])?;
        }
        Ok(index)
    }

    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn row(&self, file: &str) -> Option<&[f32]> {
        let dim = self.dim?;
        let idx = *self.by_path.get(file)?;
        Some(&self.rows[idx * dim..(idx + 1) * dim])
    }

    /// Checks that `vector` could be upserted without modifying the index.
    pub fn validate(&self, vector: &[f32]) -> Result<(), SearchError> {
        if vector.is_empty() {
            return Err(SearchError::EmptyVector);
        }
        check_finite(vector)?;
        match self.dim {
            Some(dim) if dim != vector.len() => Err(SearchError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Inserts or replaces the row for `file`. Returns `true` for a new row.
    pub fn upsert(&mut self, file: String, vector: &[f32]) -> Result<bool, SearchError> {
        self.validate(vector)?;
        let dim = *self.dim.get_or_insert(vector.len());

        if let Some(&idx) = self.by_path.get(&file) {
            self.rows[idx * dim..(idx + 1) * dim].copy_from_slice(vector);
            debug!(file = %file, "replaced embedding");
            return Ok(false);
        }
        self.by_path.insert(file.clone(), self.paths.len());
        self.paths.push(file);
        self.rows.extend_from_slice(vector);
        Ok(true)
    }

    pub fn cosine_similarity(&self, query: &[f32]) -> Result<Vec<f32>, SearchError> {
        let dim = self.check_query(query)?;
        let query = normalized(query);
        Ok(self
            .rows
            .chunks_exact(dim)
            .map(|row| dot(&normalized(row), &query))
            .collect())
    }

    pub fn euclidean_distance(&self, query: &[f32]) -> Result<Vec<f32>, SearchError> {
        self.check_query(query)?;
        let dim = query.len();
        Ok(self
            .rows
            .chunks_exact(dim)
            .map(|row| {
                let squared = row
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (f64::from(*a) - f64::from(*b)).powi(2))
                    .sum::<f64>();
                squared.sqrt() as f32
            })
            .collect())
    }

    /// Ranks rows against `query`: cosine best-first by similarity, euclidean
    /// nearest-first by distance.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        metric: Metric,
    ) -> Result<Vec<ScoredPath>, SearchError> {
        if self.dim.is_none() {
            return Ok(Vec::new());
        }
        let scores = match metric {
            Metric::Cosine => self.cosine_similarity(query)?,
            Metric::Euclidean => self.euclidean_distance(query)?,
        };
        let mut ranked = scores
            .into_iter()
            .zip(&self.paths)
            .map(|(score, file)| ScoredPath {
                file: file.clone(),
                score,
            })
            .collect::<Vec<_>>();
        match metric {
            Metric::Cosine => ranked.sort_by(|a, b| descending(a, b)),
            Metric::Euclidean => ranked.sort_by(|a, b| descending(b, a)),
        }
        ranked.truncate(top_k);
        Ok(ranked)
    }

    fn check_query(&self, query: &[f32]) -> Result<usize, SearchError> {
        let expected = self.dim.unwrap_or(0);
        if query.len() != expected || expected == 0 {
            return Err(SearchError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }
        check_finite(query)?;
        Ok(expected)
    }
}

fn check_finite(vector: &[f32]) -> Result<(), SearchError> {
    match vector.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(SearchError::NonFinite { index }),
        None => Ok(()),
    }
}

fn descending(a: &ScoredPath, b: &ScoredPath) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.file.cmp(&a.file))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// Zero vectors stay zero, so they score 0 against everything. The norm is
// taken in f64 so squares of large f32 components cannot overflow.
fn normalized(values: &[f32]) -> Vec<f32> {
    let norm = values
        .iter()
        .map(|v| f64::from(*v).powi(2))
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 {
        values
            .iter()
            .map(|v| (f64::from(*v) / norm) as f32)
            .collect()
    } else {
        values.to_vec()
    }
}
