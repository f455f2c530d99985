use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ignore::WalkBuilder;
use tracing::warn;

/// Embeddings loaded from disk, stored row-major next to their source paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingSet {
    dim: Option<usize>,
    paths: Vec<String>,
    data: Vec<f32>,
}

impl EmbeddingSet {
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// `(rows, dim)`; dim is 0 when nothing was loaded.
    pub fn shape(&self) -> (usize, usize) {
        (self.len(), self.dim.unwrap_or(0))
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn row(&self, idx: usize) -> Option<&[f32]> {
        let dim = self.dim?;
        if idx >= self.len() {
            return None;
        }
        Some(&self.data[idx * dim..(idx + 1) * dim])
    }

    pub fn into_parts(self) -> (Option<usize>, Vec<String>, Vec<f32>) {
        (self.dim, self.paths, self.data)
    }

    fn push(&mut self, path: String, vector: Vec<f32>) -> bool {
        match self.dim {
            Some(dim) if dim != vector.len() => return false,
            Some(_) => {}
            None => self.dim = Some(vector.len()),
        }
        self.paths.push(path);
        self.data.extend(vector);
        true
    }
}

pub fn save_embedding(path: &Path, embedding: &[f32]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    let raw = serde_json::to_string(embedding)?;
    std::fs::write(path, raw).with_context(|| format!("failed writing {}", path.display()))?;
    Ok(())
}

pub fn read_embedding(path: &Path) -> Result<Vec<f32>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str::<Vec<f32>>(&raw)
        .with_context(|| format!("failed parsing embedding {}", path.display()))
}

/// Loads every `*.json` under `dir`; unreadable, non-finite and dimension-outlier
/// files are skipped.
pub fn load_embeddings(dir: &Path) -> Result<EmbeddingSet> {
    if !dir.is_dir() {
        bail!("embedding directory does not exist: {}", dir.display());
    }

    let mut set = EmbeddingSet::default();
    for path in json_files(dir) {
        let vector = match read_embedding(&path) {
            Ok(vector) if vector.is_empty() => {
                warn!(file = %path.display(), "skipping empty embedding");
                continue;
            }
            Ok(vector) if vector.iter().any(|v| !v.is_finite()) => {
                warn!(file = %path.display(), "skipping embedding with non-finite values");
                continue;
            }
            Ok(vector) => vector,
            Err(err) => {
                warn!(file = %path.display(), error = %format!("{err:#}"), "skipping unreadable embedding");
                continue;
            }
        };
        let len = vector.len();
        if !set.push(path.display().to_string(), vector) {
            warn!(
                file = %path.display(),
                expected = set.dim().unwrap_or(0),
                actual = len,
                "skipping embedding with mismatched dimension"
            );
        }
    }
    Ok(set)
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = WalkBuilder::new(dir)
        .standard_filters(false)
        .build()
        .flatten()
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == "json")
        })
        .collect::<Vec<_>>();
    files.sort();
    files
}
