use std::{collections::HashMap, path::Path, sync::Mutex};

use anyhow::{Context, Result, anyhow};
use ort::{session::Session, value::Tensor};

use crate::config::{EmbeddingConfig, ExecutionDevice};

pub struct ImageEmbeddingEngine {
    config: EmbeddingConfig,
    device_used: ExecutionDevice,
    backend: EmbeddingBackend,
}

enum EmbeddingBackend {
    Onnx(OnnxBackend),
    Pseudo,
    Unavailable(String),
}

struct OnnxBackend {
    session: Mutex<Session>,
}

impl ImageEmbeddingEngine {
    pub fn new(config: EmbeddingConfig) -> Self {
        let device_used = resolve_device(config.execution_device);
        let backend = match build_backend(&config) {
            Ok(backend) => backend,
            Err(err) => EmbeddingBackend::Unavailable(format!("{err:#}")),
        };
        Self {
            config,
            device_used,
            backend,
        }
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn runtime_name(&self) -> &'static str {
        "ort"
    }

    pub fn device_mode(&self) -> &'static str {
        match self.device_used {
            ExecutionDevice::Cpu => "cpu",
            ExecutionDevice::GpuPreferred => "gpu",
        }
    }

    /// Embeds preprocessed CHW images, one output row per input.
    pub fn embed_batch(&self, images: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let expected = self.config.input_len();
        if let Some((idx, bad)) = images
            .iter()
            .enumerate()
            .find(|(_, img)| img.len() != expected)
        {
            return Err(anyhow!(
                "image {idx} in batch has {} values, expected {expected}",
                bad.len()
            ));
        }
        match &self.backend {
            EmbeddingBackend::Onnx(backend) => backend.embed_batch(images, &self.config),
            EmbeddingBackend::Pseudo => Ok(images
                .iter()
                .map(|pixels| pseudo_embed(pixels, self.config.vector_dim))
                .collect::<Vec<_>>()),
            EmbeddingBackend::Unavailable(msg) => Err(anyhow!(
                "embedding unavailable: {msg}. set IMGVEC_ALLOW_PSEUDO_EMBED=true only for local test scaffolding"
            )),
        }
    }
}

impl OnnxBackend {
    fn embed_batch(&self, images: &[Vec<f32>], cfg: &EmbeddingConfig) -> Result<Vec<Vec<f32>>> {
        let batch_size = images.len();
        let side = i64::from(cfg.crop_size);
        let mut packed = Vec::with_capacity(batch_size * cfg.input_len());
        for image in images {
            packed.extend_from_slice(image);
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("embedding session lock poisoned"))?;

        let pixels = Tensor::<f32>::from_array((vec![batch_size as i64, 3, side, side], packed))?;
        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| anyhow!("embedding model declares no inputs"))?;
        let mut model_inputs = HashMap::new();
        model_inputs.insert(input_name, pixels.upcast());

        let mut outputs = session.run(model_inputs)?;
        let first_key = outputs
            .keys()
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("embedding model returned no outputs"))?;
        let output = outputs
            .remove(first_key)
            .ok_or_else(|| anyhow!("embedding model output extraction failed"))?;
        let (shape, values) = output
            .try_extract_tensor::<f32>()
            .map_err(|err| anyhow!("embedding output decode failed: {err}"))?;

        decode_feature_maps(shape, values, batch_size, cfg.vector_dim)
    }
}

/// Accepts `[B, C]`, `[B, C, 1, 1]` and spatial `[B, C, H, W]` (average pooled).
fn decode_feature_maps(
    shape: &[i64],
    values: &[f32],
    batch_size: usize,
    target_dim: usize,
) -> Result<Vec<Vec<f32>>> {
    if shape.len() != 2 && shape.len() != 4 {
        return Err(anyhow!(
            "embedding output rank {} is unsupported",
            shape.len()
        ));
    }
    if shape[0] <= 0 {
        return Err(anyhow!(
            "embedding output batch dimension is invalid: {}",
            shape[0]
        ));
    }

    let channels = usize::try_from(shape[1]).unwrap_or(0);
    if channels == 0 {
        return Err(anyhow!("embedding output channel dimension is invalid"));
    }
    let spatial = shape[2..]
        .iter()
        .map(|d| usize::try_from(*d).unwrap_or(0))
        .product::<usize>();
    if spatial == 0 {
        return Err(anyhow!("embedding output spatial dimensions are invalid"));
    }
    if values.len() < batch_size * channels * spatial {
        return Err(anyhow!(
            "embedding output tensor too small for expected shape {batch_size}x{channels}x{spatial}"
        ));
    }

    let mut out = Vec::with_capacity(batch_size);
    for batch in 0..batch_size {
        let mut pooled = vec![0.0f32; channels];
        for (channel, slot) in pooled.iter_mut().enumerate() {
            let base = (batch * channels + channel) * spatial;
            let sum = values[base..base + spatial].iter().sum::<f32>();
            *slot = sum / spatial as f32;
        }
        out.push(fit_vector_dim(&pooled, target_dim));
    }
    Ok(out)
}

fn fit_vector_dim(values: &[f32], target_dim: usize) -> Vec<f32> {
    if target_dim == 0 {
        return Vec::new();
    }
    if values.len() == target_dim {
        return values.to_vec();
    }
    if values.len() > target_dim {
        return values[..target_dim].to_vec();
    }
    let mut out = vec![0.0f32; target_dim];
    out[..values.len()].copy_from_slice(values);
    out
}

fn build_backend(config: &EmbeddingConfig) -> Result<EmbeddingBackend> {
    if config.allow_pseudo_fallback {
        return Ok(EmbeddingBackend::Pseudo);
    }
    let model_path = Path::new(&config.model_path);
    if !model_path.exists() {
        return Err(anyhow!(
            "embedding model not found at {}",
            model_path.display()
        ));
    }

    let session = Session::builder()
        .context("failed to create ONNX session builder")?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ONNX model {}", model_path.display()))?;
    tracing::info!(model = %model_path.display(), "loaded embedding model");

    Ok(EmbeddingBackend::Onnx(OnnxBackend {
        session: Mutex::new(session),
    }))
}

fn resolve_device(preferred: ExecutionDevice) -> ExecutionDevice {
    match preferred {
        ExecutionDevice::Cpu => ExecutionDevice::Cpu,
        ExecutionDevice::GpuPreferred => {
            if gpu_runtime_available() {
                ExecutionDevice::GpuPreferred
            } else {
                ExecutionDevice::Cpu
            }
        }
    }
}

fn gpu_runtime_available() -> bool {
    std::env::var("EMBEDDING_GPU_AVAILABLE")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

// Channel-mean buckets of the pixel buffer, stable across runs.
fn pseudo_embed(pixels: &[f32], dim: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; dim.max(1)];
    let n = out.len();
    let mut counts = vec![0u32; n];
    for (idx, value) in pixels.iter().enumerate() {
        out[idx % n] += *value;
        counts[idx % n] += 1;
    }
    for (value, count) in out.iter_mut().zip(counts) {
        if count > 0 {
            *value /= count as f32;
        }
    }
    out
}
