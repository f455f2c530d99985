pub mod config;
pub mod engine;
pub mod preprocess;

pub use config::{EmbeddingConfig, ExecutionDevice, IMAGENET_MEAN, IMAGENET_STD};
pub use engine::ImageEmbeddingEngine;
pub use preprocess::{load_and_preprocess, preprocess_image};
