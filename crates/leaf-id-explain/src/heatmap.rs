//! Approximate saliency heatmap
//!
//! The heat field is derived from the image alone: the leaf is separated from
//! the background with an Otsu threshold, the distance transform of the leaf
//! mask peaks along its midrib, and a centred Gaussian favours the middle of
//! the frame. A little uniform noise gives the map texture.
//!
//! This is not gradient-based attribution; the model is never consulted.

use crate::colormap::jet;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::euclidean_squared_distance_transform;
use leaf_id_common::{ExplanationKind, ExplanationResult, PredictionResult, RecognitionError};
use leaf_id_core::image_io::{gray_to_data_uri, load_resized, rgb_to_data_uri};
use leaf_id_core::INPUT_SIZE;
use rand::Rng;
use tracing::debug;

pub const HEATMAP_CAPTION: &str = "The highlighted regions show areas the model focused on to make its prediction. Brighter areas indicate higher importance.";

const DISTANCE_WEIGHT: f32 = 0.7;
const GAUSSIAN_WEIGHT: f32 = 0.3;
const NOISE_SCALE: f32 = 0.15;
const IMAGE_ALPHA: f32 = 0.6;
const COLOR_ALPHA: f32 = 0.4;

/// Min-max normalize in place to `[0, 1]`; a constant field becomes all zeros
pub fn normalize(values: &mut [f32]) {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if range > f32::EPSILON {
        for v in values.iter_mut() {
            *v = (*v - min) / range;
        }
    } else {
        values.fill(0.0);
    }
}

/// ITU-R BT.601 luma, rounded
#[must_use]
pub fn grayscale(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Foreground mask (255) of pixels at or below the Otsu level
///
/// Leaves photographed on a light background are darker than it, so the
/// threshold is inverted.
#[must_use]
pub fn foreground_mask(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    debug!("Otsu level {}", level);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] <= level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Distance from each foreground pixel to the nearest background pixel,
/// normalized to `[0, 1]`
///
/// Background pixels are 0. Without any background pixel the field is all zeros.
#[must_use]
pub fn distance_field(mask: &GrayImage) -> Vec<f32> {
    let len = (mask.width() * mask.height()) as usize;

    // The transform measures distance to the nearest non-zero pixel, so the
    // background becomes the seed set.
    let background = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([255 - mask.get_pixel(x, y)[0]])
    });
    if background.pixels().all(|p| p[0] == 0) {
        return vec![0.0; len];
    }

    let squared = euclidean_squared_distance_transform(&background);
    let mut field: Vec<f32> = squared.pixels().map(|p| p[0].sqrt() as f32).collect();
    normalize(&mut field);
    field
}

/// Gaussian weight centred at `(w/2, h/2)` with `sigma = min(w, h) / 2`
#[must_use]
pub fn gaussian_field(width: u32, height: u32) -> Vec<f32> {
    let (cx, cy) = ((width / 2) as f32, (height / 2) as f32);
    let sigma = width.min(height) as f32 / 2.0;
    let denom = 2.0 * sigma * sigma;

    let mut field = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let (dx, dy) = (x as f32 - cx, y as f32 - cy);
            field.push((-(dx * dx + dy * dy) / denom).exp());
        }
    }
    field
}

/// Deterministic part of the heat field: `0.7 * distance + 0.3 * gaussian`
#[must_use]
pub fn saliency_base(image: &RgbImage) -> Vec<f32> {
    let mask = foreground_mask(&grayscale(image));
    let distance = distance_field(&mask);
    let gaussian = gaussian_field(image.width(), image.height());

    distance
        .iter()
        .zip(&gaussian)
        .map(|(d, g)| DISTANCE_WEIGHT * d + GAUSSIAN_WEIGHT * g)
        .collect()
}

/// Full heat field in `[0, 1]`, row-major
pub fn saliency_map<R: Rng>(image: &RgbImage, rng: &mut R) -> Vec<f32> {
    let mut heat = saliency_base(image);
    for v in heat.iter_mut() {
        *v += rng.random::<f32>() * NOISE_SCALE;
    }
    normalize(&mut heat);
    heat
}

fn check_len(heat: &[f32], width: u32, height: u32) -> Result<(), RecognitionError> {
    let expected = width as usize * height as usize;
    if heat.len() == expected {
        Ok(())
    } else {
        Err(RecognitionError::RenderFailure(format!(
            "heat field has {} values, {width}x{height} image needs {expected}",
            heat.len()
        )))
    }
}

/// Colorize `heat` and blend it over `image`
///
/// # Errors
/// `RenderFailure` unless `heat` holds one value per pixel
pub fn overlay(image: &RgbImage, heat: &[f32]) -> Result<RgbImage, RecognitionError> {
    let width = image.width();
    check_len(heat, width, image.height())?;
    Ok(RgbImage::from_fn(width, image.height(), |x, y| {
        let h = heat[(y * width + x) as usize];
        let Rgb(color) = jet((255.0 * h) as u8);
        let Rgb(pixel) = *image.get_pixel(x, y);

        let mut out = [0u8; 3];
        for c in 0..3 {
            let blended = IMAGE_ALPHA * f32::from(pixel[c]) + COLOR_ALPHA * f32::from(color[c]);
            out[c] = blended.clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    }))
}

/// Grayscale rendering of the heat field
///
/// # Errors
/// `RenderFailure` unless `heat` holds `width * height` values
pub fn heat_image(heat: &[f32], width: u32, height: u32) -> Result<GrayImage, RecognitionError> {
    check_len(heat, width, height)?;
    Ok(GrayImage::from_fn(width, height, |x, y| {
        Luma([(255.0 * heat[(y * width + x) as usize]) as u8])
    }))
}

/// Render the heatmap explanation for `bytes`
///
/// # Errors
/// `InvalidImage` for undecodable bytes, `RenderFailure` if encoding fails
pub fn render_heatmap<R: Rng>(
    bytes: &[u8],
    prediction: &PredictionResult,
    rng: &mut R,
) -> Result<ExplanationResult, RecognitionError> {
    let image = load_resized(bytes, INPUT_SIZE)?;
    let heat = saliency_map(&image, rng);

    let overlay = rgb_to_data_uri(&overlay(&image, &heat)?)?;
    let heatmap = gray_to_data_uri(&heat_image(&heat, image.width(), image.height())?)?;

    Ok(ExplanationResult {
        kind: ExplanationKind::Heatmap,
        method: ExplanationKind::Heatmap.method_name().to_string(),
        predicted_class: prediction.predicted_class.clone(),
        confidence: prediction.confidence,
        overlay,
        heatmap: Some(heatmap),
        top_features: Vec::new(),
        explanation: HEATMAP_CAPTION.to_string(),
    })
}
