//! Box-texture compositor.
//!
//! Builds a box texture from a flat "case" image containing a
//! chroma-keyed (green) insert region and an optional logo. The green
//! region's right edge is located by sampling three horizontal rows;
//! the key color becomes transparent in the foreground layer; the logo
//! is trimmed, scaled and centered within the detected container over a
//! diagonal-gradient background. Pure function of its inputs.

use image::{imageops, Rgba, RgbaImage};
use std::path::Path;
use thiserror::Error;

/// Right-edge search never goes left of this fraction of the width
const SEARCH_LIMIT_NUM: u32 = 3;
const SEARCH_LIMIT_DEN: u32 = 5;

/// Detected container edges below a quarter of the width are rejected
const MIN_PLAUSIBLE_NUM: u32 = 1;
const MIN_PLAUSIBLE_DEN: u32 = 4;

/// Logo fits within this fraction of the container width
const LOGO_MAX_WIDTH_NUM: u32 = 3;
const LOGO_MAX_WIDTH_DEN: u32 = 4;

/// ... and this fraction of the canvas height
const LOGO_MAX_HEIGHT_NUM: u32 = 4;
const LOGO_MAX_HEIGHT_DEN: u32 = 5;

/// Alpha above this counts as content when trimming logo whitespace
const TRIM_ALPHA: u8 = 16;

const GRADIENT_TOP: [u8; 3] = [0x2e, 0x2e, 0x38];
const GRADIENT_BOTTOM: [u8; 3] = [0x08, 0x08, 0x0c];

#[derive(Debug, Error)]
pub enum BoxartError {
    #[error("Image error for {0}: {1}")]
    Image(String, String),

    #[error("Case image too small: {0}x{1}")]
    TooSmall(u32, u32),
}

/// Chroma-key test: strongly green pixels mark the transparent insert
fn is_key_pixel(pixel: &Rgba<u8>) -> bool {
    let [r, g, b, a] = pixel.0;
    a > 0 && g > 96 && u16::from(g) * 2 > u16::from(r) * 3 && u16::from(g) * 2 > u16::from(b) * 3
}

/// Compose a box texture; see module docs for the algorithm
pub fn compose_box(case: &RgbaImage, logo: Option<&RgbaImage>) -> Result<RgbaImage, BoxartError> {
    let (width, height) = case.dimensions();
    if width < 8 || height < 8 {
        return Err(BoxartError::TooSmall(width, height));
    }

    let container = detect_container_edge(case)
        .unwrap_or(width * SEARCH_LIMIT_NUM / SEARCH_LIMIT_DEN);

    let mut out = gradient_background(width, height);

    if let Some(logo) = logo {
        if let Some(trimmed) = trim_transparent(logo) {
            let max_w = (container * LOGO_MAX_WIDTH_NUM / LOGO_MAX_WIDTH_DEN).max(1);
            let max_h = (height * LOGO_MAX_HEIGHT_NUM / LOGO_MAX_HEIGHT_DEN).max(1);
            let (lw, lh) = trimmed.dimensions();

            let scale = (max_w as f32 / lw as f32).min(max_h as f32 / lh as f32);
            let nw = ((lw as f32 * scale) as u32).max(1);
            let nh = ((lh as f32 * scale) as u32).max(1);
            let scaled = imageops::resize(&trimmed, nw, nh, imageops::FilterType::Lanczos3);

            let x = (i64::from(container) - i64::from(nw)) / 2;
            let y = (i64::from(height) - i64::from(nh)) / 2;
            imageops::overlay(&mut out, &scaled, x.max(0), y.max(0));
        }
    }

    // Foreground: the case with the green key knocked out
    for (x, y, pixel) in case.enumerate_pixels() {
        if is_key_pixel(pixel) || pixel.0[3] == 0 {
            continue;
        }
        out.put_pixel(x, y, *pixel);
    }

    Ok(out)
}

/// File-level wrapper used by the enrichment pipeline
pub fn compose_box_file(
    case_path: &Path,
    logo_path: Option<&Path>,
    target: &Path,
) -> Result<(), BoxartError> {
    let case = load_rgba(case_path)?;
    let logo = logo_path.map(load_rgba).transpose().unwrap_or_else(|e| {
        // A broken logo degrades to a logo-less composite
        tracing::warn!(error = %e, "Logo unreadable, composing without it");
        None
    });

    let composed = compose_box(&case, logo.as_ref())?;

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| BoxartError::Image(parent.display().to_string(), e.to_string()))?;
    }
    composed
        .save(target)
        .map_err(|e| BoxartError::Image(target.display().to_string(), e.to_string()))
}

fn load_rgba(path: &Path) -> Result<RgbaImage, BoxartError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| BoxartError::Image(path.display().to_string(), e.to_string()))
}

/// Locate the right edge of the green insert region.
///
/// Samples three horizontal rows, scanning right-to-left and stopping
/// at 60% of the width; takes the median of the rows that found green.
/// Implausibly small results are rejected.
fn detect_container_edge(case: &RgbaImage) -> Option<u32> {
    let (width, height) = case.dimensions();
    let limit = width * SEARCH_LIMIT_NUM / SEARCH_LIMIT_DEN;

    let rows = [height / 4, height / 2, height * 3 / 4];
    let mut samples: Vec<u32> = Vec::with_capacity(3);

    for y in rows {
        let mut x = width - 1;
        while x >= limit {
            if is_key_pixel(case.get_pixel(x, y)) {
                samples.push(x + 1);
                break;
            }
            if x == limit {
                break;
            }
            x -= 1;
        }
    }

    if samples.is_empty() {
        return None;
    }

    samples.sort_unstable();
    let median = samples[samples.len() / 2];

    if median < width * MIN_PLAUSIBLE_NUM / MIN_PLAUSIBLE_DEN {
        None
    } else {
        Some(median)
    }
}

/// Diagonal gradient from top-left to bottom-right
fn gradient_background(width: u32, height: u32) -> RgbaImage {
    let span = (width + height - 2).max(1) as f32;
    RgbaImage::from_fn(width, height, |x, y| {
        let t = (x + y) as f32 / span;
        let channel = |top: u8, bottom: u8| -> u8 {
            (f32::from(top) + (f32::from(bottom) - f32::from(top)) * t).round() as u8
        };
        Rgba([
            channel(GRADIENT_TOP[0], GRADIENT_BOTTOM[0]),
            channel(GRADIENT_TOP[1], GRADIENT_BOTTOM[1]),
            channel(GRADIENT_TOP[2], GRADIENT_BOTTOM[2]),
            255,
        ])
    })
}

/// Crop surrounding fully transparent pixels from a logo
fn trim_transparent(logo: &RgbaImage) -> Option<RgbaImage> {
    let (width, height) = logo.dimensions();
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;

    for (x, y, pixel) in logo.enumerate_pixels() {
        if pixel.0[3] > TRIM_ALPHA {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if !found {
        return None;
    }

    Some(imageops::crop_imm(logo, min_x, min_y, max_x - min_x + 1, max_y - min_y + 1).to_image())
}
