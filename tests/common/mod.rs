//! Shared fixtures for the integration suites

#![allow(dead_code)]

pub mod validators;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Dark elliptical leaf on a light background
pub fn leaf_image(width: u32, height: u32) -> RgbImage {
    let (cx, cy) = (f64::from(width) / 2.0, f64::from(height) / 2.0);
    let (rx, ry) = (f64::from(width) * 0.3, f64::from(height) * 0.4);
    RgbImage::from_fn(width, height, |x, y| {
        let dx = (f64::from(x) - cx) / rx;
        let dy = (f64::from(y) - cy) / ry;
        if dx * dx + dy * dy <= 1.0 {
            Rgb([40, 110 + (y % 40) as u8, 45])
        } else {
            Rgb([236, 236, 228])
        }
    })
}

pub fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut buffer, format)
        .expect("encode fixture image");
    buffer.into_inner()
}

pub fn leaf_jpeg() -> Vec<u8> {
    encode(&leaf_image(320, 240), ImageFormat::Jpeg)
}

pub fn leaf_png() -> Vec<u8> {
    encode(&leaf_image(180, 260), ImageFormat::Png)
}

/// Write a list-format class catalog into `dir`
pub fn write_catalog(dir: &Path, labels: &[&str]) {
    let json = serde_json::to_string(labels).expect("serialize catalog");
    std::fs::write(dir.join("class_names.json"), json).expect("write catalog");
}
