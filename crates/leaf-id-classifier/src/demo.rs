//! Synthetic predictions served when no model artifact is loaded

use crate::catalog::ClassCatalog;
use leaf_id_common::{PredictionResult, TopPrediction};
use rand::Rng;

pub const DEMO_MODEL_VERSION: &str = "demo-v1.0";

const MIN_CONFIDENCE: f32 = 0.75;
const MAX_CONFIDENCE: f32 = 0.98;

/// Build a plausible prediction from the catalog alone
///
/// The predicted class is uniform over the catalog; its confidence is uniform
/// in `[0.75, 0.98)`. Entry `i` of the top-K list is class `(pred + i) mod n`
/// with confidence `max(0.1, conf - 0.1 * i)`.
pub fn demo_prediction<R: Rng>(catalog: &ClassCatalog, top_k: usize, rng: &mut R) -> PredictionResult {
    let n = catalog.len();
    let predicted = rng.random_range(0..n);
    let confidence: f32 = rng.random_range(MIN_CONFIDENCE..MAX_CONFIDENCE);

    let top_predictions = (0..top_k.min(n))
        .map(|i| {
            let index = (predicted + i) % n;
            TopPrediction {
                class_name: catalog.label(index).unwrap_or_default().to_string(),
                class_index: index,
                confidence: (confidence - 0.1 * i as f32).max(0.1),
            }
        })
        .collect();

    PredictionResult {
        predicted_class: catalog.label(predicted).unwrap_or_default().to_string(),
        predicted_class_index: predicted,
        confidence,
        top_predictions,
        model_version: DEMO_MODEL_VERSION.to_string(),
        ensemble_used: false,
        processing_time_ms: 0.0,
    }
}
