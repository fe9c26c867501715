//! In-memory image I/O
//!
//! Decoding of uploaded image bytes (format sniffed from magic bytes) and
//! PNG encoding of rendered images as embeddable data URIs.

use base64::{engine::general_purpose, Engine};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use leaf_id_common::RecognitionError;
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

/// Prefix of every encoded image handed back to callers
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Errors that can occur during image I/O operations
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to encode image: {0}")]
    EncodeError(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
}

impl From<ImageError> for RecognitionError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::DecodeError(_) | ImageError::UnsupportedFormat(_) => {
                RecognitionError::InvalidImage(err.to_string())
            }
            ImageError::EncodeError(_) => RecognitionError::RenderFailure(err.to_string()),
        }
    }
}

/// Decode raw image bytes into a three-channel RGB image
///
/// Grayscale, alpha and palette images are converted to RGB. Empty payloads,
/// unknown formats and zero-sized images are rejected.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::DecodeError("empty payload".to_string()));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| ImageError::UnsupportedFormat(e.to_string()))?;

    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ImageError::DecodeError(format!("{format:?}: {e}")))?;

    if img.width() == 0 || img.height() == 0 {
        return Err(ImageError::DecodeError(format!(
            "image has zero size ({}x{})",
            img.width(),
            img.height()
        )));
    }

    debug!(
        "Decoded {:?} image {}x{} ({:?})",
        format,
        img.width(),
        img.height(),
        img.color()
    );

    Ok(match img {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    })
}

/// Resize to an exact square, ignoring aspect ratio
pub fn resize_square(image: &RgbImage, size: u32) -> RgbImage {
    if image.dimensions() == (size, size) {
        return image.clone();
    }
    image::imageops::resize(image, size, size, FilterType::CatmullRom)
}

/// Decode bytes and resize to a `size`x`size` RGB image
pub fn load_resized(bytes: &[u8], size: u32) -> Result<RgbImage, ImageError> {
    let image = decode_image(bytes)?;
    Ok(resize_square(&image, size))
}

/// Encode an image as PNG bytes
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| ImageError::EncodeError(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Encode an RGB image as a PNG data URI
pub fn rgb_to_data_uri(image: &RgbImage) -> Result<String, ImageError> {
    let png = encode_png(&DynamicImage::ImageRgb8(image.clone()))?;
    Ok(png_to_data_uri(&png))
}

/// Encode a grayscale image as a PNG data URI
pub fn gray_to_data_uri(image: &GrayImage) -> Result<String, ImageError> {
    let png = encode_png(&DynamicImage::ImageLuma8(image.clone()))?;
    Ok(png_to_data_uri(&png))
}

fn png_to_data_uri(png: &[u8]) -> String {
    format!(
        "{}{}",
        PNG_DATA_URI_PREFIX,
        general_purpose::STANDARD.encode(png)
    )
}

/// Extract the PNG payload of a data URI produced by this module
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ImageError> {
    let payload = uri.strip_prefix(PNG_DATA_URI_PREFIX).ok_or_else(|| {
        ImageError::UnsupportedFormat("expected a data:image/png;base64 URI".to_string())
    })?;
    general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ImageError::DecodeError(format!("invalid base64 payload: {e}")))
}
