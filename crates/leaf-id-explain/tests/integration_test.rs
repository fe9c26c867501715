//! Integration tests for the explanation renderers

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use leaf_id_common::{ExplanationKind, PredictionResult, RecognitionError};
use leaf_id_core::image_io::decode_data_uri;
use leaf_id_explain::heatmap::saliency_base;
use leaf_id_explain::segments::tint_segments;
use leaf_id_explain::{ExplanationRenderer, SegmentGrid, SEGMENT_SIZE};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Dark elliptical leaf centred on a light background
fn leaf(size: u32) -> RgbImage {
    let c = size as f32 / 2.0;
    RgbImage::from_fn(size, size, |x, y| {
        let dx = (x as f32 - c) / (size as f32 * 0.25);
        let dy = (y as f32 - c) / (size as f32 * 0.4);
        if dx * dx + dy * dy <= 1.0 {
            Rgb([45, 125, 50])
        } else {
            Rgb([235, 235, 225])
        }
    })
}

fn png(image: &RgbImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("encode fixture");
    buffer.into_inner()
}

fn prediction() -> PredictionResult {
    PredictionResult {
        predicted_class: "Azadirachta_indica".to_string(),
        predicted_class_index: 1,
        confidence: 0.72,
        top_predictions: Vec::new(),
        model_version: "efficientnet-mobilenet-ensemble".to_string(),
        ensemble_used: true,
        processing_time_ms: 30.0,
    }
}

#[test]
fn test_saliency_peaks_inside_the_leaf() {
    let image = leaf(224);
    let base = saliency_base(&image);

    assert_eq!(base.len(), 224 * 224);
    assert!(base.iter().all(|v| (0.0..=1.0 + 1e-6).contains(v)));

    let at = |x: usize, y: usize| base[y * 224 + x];
    assert!(at(112, 112) > 0.9, "centre of the leaf should be hottest");
    assert!(at(0, 0) < 0.2, "background corner should be cold");

    // No noise in the base field
    assert_eq!(base, saliency_base(&image));
}

#[test]
fn test_segment_grid_over_model_input() {
    let grid = SegmentGrid::new(224, 224, SEGMENT_SIZE);
    assert_eq!((grid.columns(), grid.rows()), (12, 12));
    assert_eq!(grid.segment_count(), 144);

    let central = grid.central_segments();
    assert_eq!(central.len(), 49);
    assert!(central.contains(&grid.segment_at(112, 112)));
    assert!(!central.contains(&grid.segment_at(0, 0)));

    let image = leaf(224);
    let tinted = tint_segments(&image, &grid, &central);
    assert_eq!(tinted.get_pixel(0, 0), image.get_pixel(0, 0));
    let (before, after) = (image.get_pixel(112, 112), tinted.get_pixel(112, 112));
    assert!(after[1] > before[1]);
    assert!(after[0] < before[0]);
}

#[test]
fn test_renderers_ignore_the_predicted_class() {
    let bytes = png(&leaf(160));
    let renderer = ExplanationRenderer::new();

    let mut other = prediction();
    other.predicted_class = "Mentha".to_string();
    other.predicted_class_index = 3;

    let a = renderer.segments(&bytes, &prediction()).unwrap();
    let b = renderer.segments(&bytes, &other).unwrap();
    assert_eq!(a.overlay, b.overlay);
    assert_eq!(b.predicted_class, "Mentha");
}

#[test]
fn test_combined_explanation() {
    let bytes = png(&leaf(300));
    let combined = ExplanationRenderer::with_seed(4)
        .combined(&bytes, &prediction())
        .unwrap();

    assert_eq!(combined.heatmap.kind, ExplanationKind::Heatmap);
    assert_eq!(combined.segments.kind, ExplanationKind::SegmentAttribution);
    assert_eq!(combined.heatmap.confidence, 0.72);

    let raw = decode_data_uri(combined.heatmap.heatmap.as_deref().unwrap()).unwrap();
    let raw = image::load_from_memory(&raw).unwrap();
    assert_eq!((raw.width(), raw.height()), (224, 224));
    assert_eq!(raw.color(), image::ColorType::L8);
}

#[test]
fn test_undecodable_bytes_fail_both_strategies() {
    let renderer = ExplanationRenderer::with_seed(1);
    assert!(matches!(
        renderer.heatmap(b"\x89PNG broken", &prediction()),
        Err(RecognitionError::InvalidImage(_))
    ));
    assert!(matches!(
        renderer.combined(&[], &prediction()),
        Err(RecognitionError::InvalidImage(_))
    ));
}

#[test]
fn test_large_heatmap_does_not_block_other_renders() {
    let renderer = Arc::new(ExplanationRenderer::with_seed(2));
    let large = png(&leaf(4000));
    let small = png(&leaf(224));
    let large_done = Arc::new(AtomicBool::new(false));

    let slow = {
        let renderer = Arc::clone(&renderer);
        let large_done = Arc::clone(&large_done);
        thread::spawn(move || {
            let result = renderer.heatmap(&large, &prediction());
            large_done.store(true, Ordering::SeqCst);
            result
        })
    };

    thread::sleep(Duration::from_millis(30));
    let quick = renderer.heatmap(&small, &prediction()).unwrap();
    assert!(
        !large_done.load(Ordering::SeqCst),
        "small heatmap waited for the large one"
    );
    assert_eq!(quick.kind, ExplanationKind::Heatmap);

    let slow = slow.join().expect("render thread panicked").unwrap();
    assert_eq!(slow.kind, ExplanationKind::Heatmap);
}

#[test]
fn test_seeded_renderer_is_reproducible_across_calls() {
    let bytes = png(&leaf(96));
    let (a, b) = (ExplanationRenderer::with_seed(8), ExplanationRenderer::with_seed(8));

    let first = a.heatmap(&bytes, &prediction()).unwrap();
    assert_eq!(first.heatmap, b.heatmap(&bytes, &prediction()).unwrap().heatmap);

    // Each call draws fresh noise, the sequence still follows the seed
    let second = a.heatmap(&bytes, &prediction()).unwrap();
    assert_ne!(first.heatmap, second.heatmap);
    assert_eq!(second.heatmap, b.heatmap(&bytes, &prediction()).unwrap().heatmap);
}
