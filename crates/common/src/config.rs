use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: String,
    pub embedding_dir: String,
    pub model_path: String,
    pub batch_size: usize,
    pub default_top_k: usize,
    pub bind_host: String,
    pub port: u16,
    pub query_url: String,
    pub persist_upserts: bool,
    pub api_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: "animals10/raw-img".to_string(),
            embedding_dir: "animals10/embedding".to_string(),
            model_path: "models/efficientnet_v2_m.onnx".to_string(),
            batch_size: 8,
            default_top_k: 5,
            bind_host: "127.0.0.1".to_string(),
            port: 1234,
            query_url: "http://127.0.0.1:1234/query".to_string(),
            persist_upserts: true,
            api_token: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed reading config file: {}", path.display()))?;
            toml::from_str::<Self>(&raw)
                .with_context(|| format!("failed parsing config file: {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var("IMGVEC_DATA_DIR") {
            cfg.data_dir = dir;
        }
        if let Ok(dir) = std::env::var("IMGVEC_EMBEDDING_DIR") {
            cfg.embedding_dir = dir;
        }
        if let Ok(model) = std::env::var("IMGVEC_MODEL_PATH") {
            cfg.model_path = model;
        }
        if let Ok(batch) = std::env::var("IMGVEC_BATCH_SIZE") {
            cfg.batch_size = batch
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(cfg.batch_size);
        }
        if let Ok(top_k) = std::env::var("IMGVEC_DEFAULT_TOP_K") {
            cfg.default_top_k = top_k.parse().unwrap_or(cfg.default_top_k);
        }
        if let Ok(host) = std::env::var("IMGVEC_BIND_ADDR") {
            cfg.bind_host = host;
        }
        if let Ok(port) = std::env::var("IMGVEC_PORT") {
            cfg.port = port.parse().unwrap_or(cfg.port);
        }
        if let Ok(url) = std::env::var("IMGVEC_QUERY_URL") {
            cfg.query_url = url;
        }
        if let Ok(token) = std::env::var("IMGVEC_API_TOKEN") {
            cfg.api_token = Some(token);
        }

        Ok(cfg)
    }
}
