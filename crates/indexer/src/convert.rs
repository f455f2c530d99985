use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::{DynamicImage, codecs::jpeg::JpegEncoder};
use serde::Serialize;
use tracing::{info, warn};

use crate::telemetry::IndexerTelemetry;

const JPEG_QUALITY: u8 = 100;
const CONVERTIBLE_EXTENSIONS: &[&str] = &["jpeg", "png"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionReport {
    pub converted: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub fn convert_images_to_jpeg(data_dir: &Path) -> Result<ConversionReport> {
    convert_images_to_jpeg_with_telemetry(data_dir, None)
}

/// Re-encodes every `<class>/<file>.{jpeg,png}` as `.jpg` and removes the source.
///
/// The source is only deleted once the JPEG has been fully written. A file
/// that fails is counted and left in place; the run continues.
pub fn convert_images_to_jpeg_with_telemetry(
    data_dir: &Path,
    telemetry: Option<&IndexerTelemetry>,
) -> Result<ConversionReport> {
    let mut report = ConversionReport::default();
    for path in class_level_files(data_dir)? {
        if !is_convertible(&path) {
            report.skipped += 1;
            continue;
        }
        match convert_one(&path) {
            Ok(target) => {
                report.converted += 1;
                info!(source = %path.display(), target = %target.display(), "converted image");
                if let Some(telemetry) = telemetry {
                    telemetry.inc_images_converted(1);
                }
            }
            Err(err) => {
                report.failed += 1;
                warn!(source = %path.display(), error = %format!("{err:#}"), "image conversion failed");
                if let Some(telemetry) = telemetry {
                    telemetry.inc_conversion_failures(1);
                }
            }
        }
    }
    Ok(report)
}

fn class_level_files(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let classes = fs::read_dir(data_dir)
        .with_context(|| format!("failed listing data dir {}", data_dir.display()))?;
    for class in classes.flatten() {
        let class_path = class.path();
        if !class_path.is_dir() {
            continue;
        }
        let Ok(entries) = fs::read_dir(&class_path) else {
            warn!(dir = %class_path.display(), "skipping unreadable class directory");
            continue;
        };
        out.extend(
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_file()),
        );
    }
    out.sort();
    Ok(out)
}

fn is_convertible(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()))
}

fn convert_one(path: &Path) -> Result<PathBuf> {
    let img = image::open(path).with_context(|| format!("failed decoding {}", path.display()))?;
    let img = strip_alpha(img);

    let target = path.with_extension("jpg");
    if target.exists() {
        warn!(target = %target.display(), "overwriting existing jpeg");
    }

    // Encode beside the target and rename, so an existing .jpg is only
    // replaced by a complete file.
    let staging = target.with_extension("jpg.part");
    if let Err(err) = write_jpeg(&img, &staging) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }
    if let Err(err) = fs::rename(&staging, &target) {
        let _ = fs::remove_file(&staging);
        return Err(err).with_context(|| format!("failed replacing {}", target.display()));
    }

    fs::remove_file(path)
        .with_context(|| format!("failed deleting original {}", path.display()))?;
    info!(source = %path.display(), "deleted original file");
    Ok(target)
}

// JPEG carries no alpha; grayscale stays single-channel.
fn strip_alpha(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) => img,
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(img.to_luma8()),
        DynamicImage::ImageRgb8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn write_jpeg(img: &DynamicImage, target: &Path) -> Result<()> {
    let file =
        File::create(target).with_context(|| format!("failed creating {}", target.display()))?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .with_context(|| format!("failed encoding {}", target.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed flushing {}", target.display()))?;
    Ok(())
}
