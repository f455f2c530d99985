use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use common::config::AppConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use search_core::{EmbeddingIndex, RetrievalDefaults};
use tokio::sync::{Mutex, RwLock};

#[derive(Clone)]
pub struct AppState {
    pub metrics: PrometheusHandle,
    pub api_token: Option<String>,
    pub index: Arc<RwLock<EmbeddingIndex>>,
    pub retrieval: RetrievalDefaults,
    pub embedding_dir: PathBuf,
    pub persist_upserts: bool,
    /// Held for a whole upsert so validation, persistence and insertion see
    /// the same index dimension.
    pub upserts: Arc<Mutex<()>>,
    shutting_down: Arc<AtomicBool>,
}

impl AppState {
    pub fn from_config(cfg: &AppConfig, index: EmbeddingIndex) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(Self {
            metrics: handle,
            api_token: cfg.api_token.clone(),
            index: Arc::new(RwLock::new(index)),
            retrieval: RetrievalDefaults::with_top_k(cfg.default_top_k),
            embedding_dir: PathBuf::from(&cfg.embedding_dir),
            persist_upserts: cfg.persist_upserts,
            upserts: Arc::new(Mutex::new(())),
            shutting_down: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn for_tests() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            metrics: recorder.handle(),
            api_token: None,
            index: Arc::new(RwLock::new(EmbeddingIndex::new())),
            retrieval: RetrievalDefaults::default(),
            embedding_dir: std::env::temp_dir().join("imgvec-test-embedding"),
            persist_upserts: false,
            upserts: Arc::new(Mutex::new(())),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_index(mut self, index: EmbeddingIndex) -> Self {
        self.index = Arc::new(RwLock::new(index));
        self
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Disk location for an upserted file, if it lives under the embedding dir.
    pub fn persist_target(&self, file: &str) -> Option<PathBuf> {
        let path = Path::new(file);
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.embedding_dir) {
            return None;
        }
        if path.extension().is_none_or(|ext| ext != "json") {
            return None;
        }
        Some(path.to_path_buf())
    }
}

pub fn load_index(embedding_dir: &Path) -> anyhow::Result<EmbeddingIndex> {
    let set = indexer::load_embeddings(embedding_dir)?;
    let (dim, paths, data) = set.into_parts();
    EmbeddingIndex::from_set(dim, paths, &data)
        .with_context(|| format!("failed indexing embeddings from {}", embedding_dir.display()))
}
