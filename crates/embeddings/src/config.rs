#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionDevice {
    Cpu,
    GpuPreferred,
}

/// ImageNet channel statistics used by the pretrained backbone.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub model_path: String,
    pub vector_dim: usize,
    pub resize_size: u32,
    pub crop_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub batch_size: usize,
    pub execution_device: ExecutionDevice,
    pub allow_pseudo_fallback: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let model_path = std::env::var("IMGVEC_MODEL_PATH")
            .unwrap_or_else(|_| "models/efficientnet_v2_m.onnx".to_string());
        Self {
            model_path,
            vector_dim: 1280,
            resize_size: 480,
            crop_size: 480,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            batch_size: 8,
            execution_device: ExecutionDevice::from_env(),
            allow_pseudo_fallback: std::env::var("IMGVEC_ALLOW_PSEUDO_EMBED")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(cfg!(test)),
        }
    }
}

impl EmbeddingConfig {
    /// Number of `f32` values in one preprocessed CHW image.
    pub fn input_len(&self) -> usize {
        let side = self.crop_size as usize;
        3 * side * side
    }
}

impl ExecutionDevice {
    pub fn from_env() -> Self {
        let raw = std::env::var("EMBEDDING_DEVICE").unwrap_or_default();
        if raw.eq_ignore_ascii_case("gpu") {
            Self::GpuPreferred
        } else {
            Self::Cpu
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EmbeddingConfig;

    #[test]
    fn defaults_match_efficientnet_v2_m_transforms() {
        let cfg = EmbeddingConfig::default();
        assert_eq!(cfg.vector_dim, 1280);
        assert_eq!(cfg.resize_size, 480);
        assert_eq!(cfg.crop_size, 480);
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.input_len(), 3 * 480 * 480);
    }
}
