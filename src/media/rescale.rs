// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-place image downscaling.

use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};

/// Downscale the image at `path` so it fits within `max_width` x `max_height`.
///
/// A bound of 0 leaves that axis unconstrained. Images never grow, and an
/// image that already fits is left untouched on disk. The file is rewritten
/// in the format it was decoded from.
///
/// Returns `false` if the image could not be decoded, resized or written.
pub fn rescale_image(path: &Path, max_width: u32, max_height: u32) -> bool {
    match try_rescale(path, max_width, max_height) {
        Ok(Some((width, height))) => {
            tracing::debug!("Resized {} to {}x{}", path.display(), width, height);
            true
        }
        Ok(None) => true,
        Err(e) => {
            tracing::error!("Failed to resize {}: {:#}", path.display(), e);
            false
        }
    }
}

fn try_rescale(path: &Path, max_width: u32, max_height: u32) -> Result<Option<(u32, u32)>> {
    if max_width == 0 && max_height == 0 {
        return Ok(None);
    }

    let reader = ImageReader::open(path)
        .with_context(|| format!("Failed to open image at {}", path.display()))?
        .with_guessed_format()
        .context("Failed to read image header")?;
    let format = reader
        .format()
        .or_else(|| ImageFormat::from_path(path).ok())
        .context("Unrecognised image format")?;
    let image = reader.decode().context("Failed to decode image")?;

    let Some((width, height)) = fit_within(image.width(), image.height(), max_width, max_height) else {
        return Ok(None);
    };

    let resized = image.resize_exact(width, height, FilterType::Triangle);
    // The JPEG encoder rejects alpha channels.
    let resized = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        _ => resized,
    };
    resized
        .save_with_format(path, format)
        .with_context(|| format!("Failed to write resized image to {}", path.display()))?;

    Ok(Some((width, height)))
}

/// Target size for a `width` x `height` image bounded by the given maxima,
/// or `None` when it already fits.
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> Option<(u32, u32)> {
    let fits_width = max_width == 0 || width <= max_width;
    let fits_height = max_height == 0 || height <= max_height;
    if (fits_width && fits_height) || width == 0 || height == 0 {
        return None;
    }

    let ratio = |max: u32, actual: u32| {
        if max == 0 {
            f64::INFINITY
        } else {
            f64::from(max) / f64::from(actual)
        }
    };
    let scale = ratio(max_width, width).min(ratio(max_height, height));

    let scaled = |actual: u32| ((f64::from(actual) * scale).round() as u32).max(1);
    Some((scaled(width), scaled(height)))
}
