use std::path::PathBuf;

use ahash::AHashSet;
use anyhow::{Context, Result, bail};
use common::layout::embedding_path_for;
use embeddings::{ImageEmbeddingEngine, load_and_preprocess};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    scanner::{ImageFolder, ImageSample},
    store::save_embedding,
    telemetry::IndexerTelemetry,
};

#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub embedding_dir: PathBuf,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub batches: usize,
    pub written: usize,
    pub failed: usize,
}

pub fn run_extraction(
    folder: &ImageFolder,
    engine: &ImageEmbeddingEngine,
    opts: &ExtractionOptions,
) -> Result<ExtractionReport> {
    run_extraction_with_telemetry(folder, engine, opts, None)
}

/// Embeds every sample of `folder` in fixed-size batches and writes one JSON
/// file per image under `opts.embedding_dir`, mirroring the class layout.
pub fn run_extraction_with_telemetry(
    folder: &ImageFolder,
    engine: &ImageEmbeddingEngine,
    opts: &ExtractionOptions,
    telemetry: Option<&IndexerTelemetry>,
) -> Result<ExtractionReport> {
    let batch_size = opts.batch_size.max(1);
    let total = folder.samples().len();
    let mut report = ExtractionReport::default();
    let mut targets = AHashSet::with_capacity(total);
    let mut done = 0usize;

    if let Some(telemetry) = telemetry {
        telemetry.inc_images_scanned(total as u64);
    }

    for (batch_idx, batch) in folder.samples().chunks(batch_size).enumerate() {
        let prepared = batch
            .par_iter()
            .map(|sample| load_and_preprocess(&sample.path, engine.config()))
            .collect::<Vec<_>>();

        let mut kept: Vec<&ImageSample> = Vec::with_capacity(batch.len());
        let mut pixels = Vec::with_capacity(batch.len());
        for (sample, result) in batch.iter().zip(prepared) {
            match result {
                Ok(values) => {
                    kept.push(sample);
                    pixels.push(values);
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(file = %sample.path.display(), error = %format!("{err:#}"), "skipping unreadable image");
                    if let Some(telemetry) = telemetry {
                        telemetry.inc_extraction_failures(1);
                    }
                }
            }
        }

        let vectors = engine
            .embed_batch(&pixels)
            .with_context(|| format!("embedding batch {batch_idx} failed"))?;
        if vectors.len() != kept.len() {
            bail!(
                "embedding batch {batch_idx} returned {} vectors for {} images",
                vectors.len(),
                kept.len()
            );
        }

        for (sample, vector) in kept.into_iter().zip(vectors) {
            if folder.class_of(&sample.path) != Some(sample.class_idx) {
                bail!(
                    "label mismatch for {}: sample class {} does not match its directory",
                    sample.path.display(),
                    sample.class_idx
                );
            }
            let target = embedding_path_for(&sample.path, folder.root(), &opts.embedding_dir)?;
            if !targets.insert(target.clone()) {
                warn!(target = %target.display(), source = %sample.path.display(), "embedding target already written in this run, overwriting");
            }
            save_embedding(&target, &vector)?;
            report.written += 1;
            if let Some(telemetry) = telemetry {
                telemetry.inc_embeddings_written(1);
            }
        }

        done += batch.len();
        report.batches += 1;
        info!(batch = batch_idx, done, total, "extraction progress");
    }

    if let Some(telemetry) = telemetry {
        telemetry.mark_run_finished();
    }
    Ok(report)
}
