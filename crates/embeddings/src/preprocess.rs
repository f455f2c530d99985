use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, imageops::FilterType};

use crate::config::EmbeddingConfig;

pub fn load_and_preprocess(path: &Path, cfg: &EmbeddingConfig) -> Result<Vec<f32>> {
    let img = image::open(path)
        .with_context(|| format!("failed decoding image {}", path.display()))?;
    Ok(preprocess_image(&img, cfg))
}

/// Resize-shorter-side, center-crop, rescale and normalize into a CHW buffer.
pub fn preprocess_image(img: &DynamicImage, cfg: &EmbeddingConfig) -> Vec<f32> {
    let (width, height) = scaled_dims(img.width(), img.height(), cfg.resize_size);
    let resized = img.resize_exact(width, height, FilterType::Triangle);

    let crop = cfg.crop_size.max(1);
    let left = center_offset(width, crop);
    let top = center_offset(height, crop);
    let cropped = resized
        .crop_imm(left, top, crop.min(width), crop.min(height))
        .to_rgb8();

    let side = crop as usize;
    let plane = side * side;
    let mut out = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in cropped.enumerate_pixels() {
        let offset = y as usize * side + x as usize;
        for channel in 0..3 {
            let scaled = f32::from(pixel[channel]) / 255.0;
            out[channel * plane + offset] = (scaled - cfg.mean[channel]) / cfg.std[channel];
        }
    }
    out
}

// Half the slack, rounded half-to-even like torchvision's `center_crop`.
fn center_offset(len: u32, crop: u32) -> u32 {
    let slack = len.saturating_sub(crop);
    let half = slack / 2;
    if slack % 2 == 1 && half % 2 == 1 {
        half + 1
    } else {
        half
    }
}

fn scaled_dims(width: u32, height: u32, shorter: u32) -> (u32, u32) {
    let width = width.max(1);
    let height = height.max(1);
    let shorter = shorter.max(1);
    if width <= height {
        let scaled = (u64::from(height) * u64::from(shorter) / u64::from(width)).max(1);
        (shorter, u32::try_from(scaled).unwrap_or(u32::MAX))
    } else {
        let scaled = (u64::from(width) * u64::from(shorter) / u64::from(height)).max(1);
        (u32::try_from(scaled).unwrap_or(u32::MAX), shorter)
    }
}
