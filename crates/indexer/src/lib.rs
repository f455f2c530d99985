pub mod convert;
pub mod extract;
pub mod scanner;
pub mod store;
pub mod telemetry;

pub use convert::{ConversionReport, convert_images_to_jpeg, convert_images_to_jpeg_with_telemetry};
pub use extract::{ExtractionOptions, ExtractionReport, run_extraction, run_extraction_with_telemetry};
pub use scanner::{ImageFolder, ImageSample};
pub use store::{EmbeddingSet, load_embeddings, read_embedding, save_embedding};
