//! Leaf species classification via an ensemble of ONNX classifiers
//!
//! The pipeline for one image is:
//!
//! 1. decode and preprocess the bytes into a `[1, 3, 224, 224]` tensor
//! 2. run every loaded artifact of the [`ModelRuntimePool`] and apply softmax
//! 3. merge the probability vectors with the ensemble ladder
//! 4. rank the top-K classes and gate the result
//!
//! When no artifact is deployed (and strict mode is off) the classifier serves
//! synthetic demo predictions so that the surrounding system stays usable.
//!
//! # Example
//! ```no_run
//! use leaf_id_classifier::SpeciesClassifier;
//! use leaf_id_core::ServiceConfig;
//!
//! # fn main() -> anyhow::Result<()> {
//! let classifier = SpeciesClassifier::from_config(&ServiceConfig::default())?;
//! let bytes = std::fs::read("leaf.jpg")?;
//! let decision = classifier.predict(&bytes)?;
//!
//! println!("{} ({:.1}%)", decision.display_label, decision.prediction.confidence * 100.0);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod demo;
pub mod ensemble;
pub mod gate;
pub mod pool;

pub use catalog::ClassCatalog;
pub use demo::{demo_prediction, DEMO_MODEL_VERSION};
pub use ensemble::{combine, top_k, EnsembleWeights, ModelProbabilities, TOP_K};
pub use gate::ConfidenceGate;
pub use pool::{
    softmax, ArtifactKind, ArtifactLoader, ArtifactState, InferenceBackend, ModelArtifact,
    ModelRuntimePool, OnnxArtifactLoader, PoolMode, PoolStatus,
};

use ensemble::CombinedProbabilities;
use leaf_id_common::{GateDecision, PredictionResult, RecognitionError, TopPrediction};
use leaf_id_core::preprocess::preprocess_image;
use leaf_id_core::{GateConfig, ServiceConfig};
use ndarray::Array4;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Ensemble classifier with demo fallback and confidence gate
pub struct SpeciesClassifier {
    pool: ModelRuntimePool,
    catalog: ClassCatalog,
    weights: EnsembleWeights,
    gate: ConfidenceGate,
    rng: Mutex<StdRng>,
}

impl SpeciesClassifier {
    /// Assemble a classifier from already-built parts
    pub fn new(
        pool: ModelRuntimePool,
        catalog: ClassCatalog,
        weights: EnsembleWeights,
        gate: GateConfig,
    ) -> Self {
        Self {
            pool,
            catalog,
            weights,
            gate: ConfidenceGate::new(gate),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Build the classifier described by `config`
    ///
    /// Model artifacts are not touched here; they load on the first call.
    ///
    /// # Errors
    /// `InvalidConfig` for an unreadable catalog or weights file,
    /// `ArtifactMissing` for a missing catalog in strict mode
    pub fn from_config(config: &ServiceConfig) -> Result<Self, RecognitionError> {
        let models = &config.models;
        let catalog = ClassCatalog::load_or_default(&models.class_catalog, config.strict_mode)?;
        let weights = EnsembleWeights::resolve(
            models.ensemble_weights.as_deref(),
            config.ensemble.honor_weights_file,
        )?;

        let configured = vec![
            (ArtifactKind::Lightweight, models.lightweight.clone()),
            (ArtifactKind::Transformer, models.transformer.clone()),
            (ArtifactKind::Enhanced, models.enhanced.clone()),
        ];
        let loader = OnnxArtifactLoader {
            cpu_only: config.cpu_only,
        };
        let pool = ModelRuntimePool::new(configured, config.strict_mode, Box::new(loader));

        info!(
            "Classifier configured with {} classes (strict mode: {})",
            catalog.len(),
            config.strict_mode
        );

        Ok(Self::new(pool, catalog, weights, config.gate))
    }

    /// Seed the demo-prediction random source
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn gate(&self) -> &ConfidenceGate {
        &self.gate
    }

    /// Load model artifacts now instead of on the first call
    pub fn warm_up(&self) -> Result<(), RecognitionError> {
        self.pool.load()
    }

    #[must_use]
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Classify image bytes without gating
    ///
    /// # Errors
    /// - `InvalidImage` if the bytes cannot be decoded (never degraded)
    /// - `ModelUnavailable` in strict mode with no loaded artifact
    /// - `InferenceFailure` in strict mode when a model call fails
    pub fn classify(&self, bytes: &[u8]) -> Result<PredictionResult, RecognitionError> {
        let start = Instant::now();
        let tensor = preprocess_image(bytes)?;

        let mut result = match self.run_ensemble(&tensor) {
            Ok(Some(combined)) => self.rank(combined),
            Ok(None) => self.demo(),
            Err(e) if self.pool.is_strict() => return Err(e),
            Err(e) => {
                warn!("Inference failed, serving demo prediction: {}", e);
                self.demo()
            }
        };

        result.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "Classified as {} ({:.3}) by {} in {:.1}ms",
            result.predicted_class, result.confidence, result.model_version, result.processing_time_ms
        );
        Ok(result)
    }

    /// Classify and gate image bytes
    pub fn predict(&self, bytes: &[u8]) -> Result<GateDecision, RecognitionError> {
        Ok(self.gate.evaluate(self.classify(bytes)?))
    }

    /// Run every loaded artifact; `None` selects the demo path
    fn run_ensemble(
        &self,
        tensor: &Array4<f32>,
    ) -> Result<Option<CombinedProbabilities>, RecognitionError> {
        if self.pool.is_demo()? {
            return Ok(None);
        }

        let mut outputs = ModelProbabilities::default();
        for kind in self.pool.loaded_kinds()? {
            let probabilities = self.pool.probabilities(kind, tensor)?;
            if probabilities.len() != self.catalog.len() {
                return Err(RecognitionError::InferenceFailure(format!(
                    "{kind} produced {} classes, catalog has {}",
                    probabilities.len(),
                    self.catalog.len()
                )));
            }
            if probabilities.iter().any(|p| !p.is_finite()) {
                return Err(RecognitionError::InferenceFailure(format!(
                    "{kind} produced non-finite probabilities"
                )));
            }
            outputs.insert(kind, probabilities);
        }

        Ok(combine(&outputs, &self.weights))
    }

    fn rank(&self, combined: CombinedProbabilities) -> PredictionResult {
        let top_predictions: Vec<TopPrediction> = top_k(&combined.probabilities, TOP_K)
            .into_iter()
            .map(|(index, confidence)| TopPrediction {
                class_name: self.catalog.label(index).unwrap_or_default().to_string(),
                class_index: index,
                confidence,
            })
            .collect();

        // The catalog is never empty, so the ranking has a first entry
        let (predicted_class, predicted_class_index, confidence) = top_predictions
            .first()
            .map(|p| (p.class_name.clone(), p.class_index, p.confidence))
            .unwrap_or_default();

        PredictionResult {
            predicted_class,
            predicted_class_index,
            confidence,
            top_predictions,
            model_version: combined.model_version,
            ensemble_used: combined.ensemble_used,
            processing_time_ms: 0.0,
        }
    }

    fn demo(&self) -> PredictionResult {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        demo_prediction(&self.catalog, TOP_K, &mut *rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use leaf_id_common::GateOutcome;
    use std::io::Cursor;

    struct FixedLogits(Vec<f32>);

    impl InferenceBackend for FixedLogits {
        fn run(&mut self, _input: &Array4<f32>) -> Result<Vec<f32>, RecognitionError> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl InferenceBackend for Failing {
        fn run(&mut self, _input: &Array4<f32>) -> Result<Vec<f32>, RecognitionError> {
            Err(RecognitionError::InferenceFailure("device lost".to_string()))
        }
    }

    fn leaf_png() -> Vec<u8> {
        let img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 3) as u8, 120 + (y as u8), 40]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn boxed(backend: impl InferenceBackend + 'static) -> Box<dyn InferenceBackend> {
        Box::new(backend)
    }

    fn catalog(n: usize) -> ClassCatalog {
        ClassCatalog::new((0..n).map(|i| format!("species_{i}")).collect()).unwrap()
    }

    fn classifier(
        backends: Vec<(ArtifactKind, Box<dyn InferenceBackend>)>,
        classes: usize,
        strict: bool,
    ) -> SpeciesClassifier {
        SpeciesClassifier::new(
            ModelRuntimePool::from_backends(backends, strict),
            catalog(classes),
            EnsembleWeights::default(),
            GateConfig::default(),
        )
        .with_seed(11)
    }

    #[test]
    fn test_single_model_prediction() {
        let clf = classifier(
            vec![(ArtifactKind::Lightweight, boxed(FixedLogits(vec![0.0, 5.0, 1.0, 0.0, 0.0, 0.0])))],
            6,
            false,
        );
        let result = clf.classify(&leaf_png()).unwrap();

        assert_eq!(result.predicted_class, "species_1");
        assert_eq!(result.model_version, "mobilenet-v2");
        assert!(!result.ensemble_used);
        assert_eq!(result.top_predictions.len(), 5);
        assert_eq!(result.top_predictions[1].class_index, 2);
        // Ties among the zero logits keep ascending index order
        let tail: Vec<usize> = result.top_predictions[2..].iter().map(|p| p.class_index).collect();
        assert_eq!(tail, vec![0, 3, 4]);
        assert!(result.processing_time_ms >= 0.0);
    }

    #[test]
    fn test_enhanced_lightweight_ensemble() {
        let enhanced = vec![2.0, 0.0, 0.0];
        let light = vec![0.0, 2.0, 0.0];
        let clf = classifier(
            vec![
                (ArtifactKind::Lightweight, boxed(FixedLogits(light.clone()))),
                (ArtifactKind::Enhanced, boxed(FixedLogits(enhanced.clone()))),
            ],
            3,
            false,
        );
        let result = clf.classify(&leaf_png()).unwrap();

        let (pe, pl) = (softmax(&enhanced), softmax(&light));
        assert!(result.ensemble_used);
        assert_eq!(result.model_version, "efficientnet-mobilenet-ensemble");
        assert_eq!(result.predicted_class_index, 0);
        assert!((result.confidence - (0.7 * pe[0] + 0.3 * pl[0])).abs() < 1e-6);
        assert_eq!(result.top_predictions.len(), 3);
    }

    #[test]
    fn test_demo_mode_without_models() {
        let clf = classifier(vec![], 5, false);
        let a = clf.classify(&leaf_png()).unwrap();
        assert_eq!(a.model_version, DEMO_MODEL_VERSION);
        assert!((0.75..0.98).contains(&a.confidence));

        let b = classifier(vec![], 5, false).classify(&leaf_png()).unwrap();
        assert_eq!(a.predicted_class, b.predicted_class);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn test_strict_mode_without_models() {
        let clf = classifier(vec![], 5, true);
        assert!(matches!(
            clf.classify(&leaf_png()),
            Err(RecognitionError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn test_invalid_image_is_never_degraded() {
        let clf = classifier(vec![], 5, false);
        assert!(matches!(
            clf.classify(b"definitely not an image"),
            Err(RecognitionError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_inference_failure_policy() {
        let lenient = classifier(vec![(ArtifactKind::Transformer, boxed(Failing))], 5, false);
        let result = lenient.classify(&leaf_png()).unwrap();
        assert_eq!(result.model_version, DEMO_MODEL_VERSION);

        let strict = classifier(vec![(ArtifactKind::Transformer, boxed(Failing))], 5, true);
        assert!(matches!(
            strict.classify(&leaf_png()),
            Err(RecognitionError::InferenceFailure(_))
        ));
    }

    #[test]
    fn test_output_length_must_match_catalog() {
        let strict = classifier(
            vec![(ArtifactKind::Lightweight, boxed(FixedLogits(vec![1.0, 2.0])))],
            5,
            true,
        );
        assert!(matches!(
            strict.classify(&leaf_png()),
            Err(RecognitionError::InferenceFailure(_))
        ));
    }

    #[test]
    fn test_non_finite_logits() {
        let nan = || boxed(FixedLogits(vec![f32::NAN, 0.0, 0.0]));

        let lenient = classifier(vec![(ArtifactKind::Lightweight, nan())], 3, false);
        let result = lenient.classify(&leaf_png()).unwrap();
        assert_eq!(result.model_version, DEMO_MODEL_VERSION);
        assert!((0.0..=1.0).contains(&result.confidence));

        let strict = classifier(vec![(ArtifactKind::Lightweight, nan())], 3, true);
        assert!(matches!(
            strict.classify(&leaf_png()),
            Err(RecognitionError::InferenceFailure(_))
        ));

        // A NaN from one ensemble member poisons the blend, so it fails too
        let mixed = classifier(
            vec![
                (ArtifactKind::Enhanced, boxed(FixedLogits(vec![4.0, 0.0, 0.0]))),
                (ArtifactKind::Lightweight, nan()),
            ],
            3,
            true,
        );
        assert!(matches!(
            mixed.classify(&leaf_png()),
            Err(RecognitionError::InferenceFailure(_))
        ));

        let infinite = classifier(
            vec![(ArtifactKind::Lightweight, boxed(FixedLogits(vec![f32::INFINITY, 0.0, 0.0])))],
            3,
            true,
        );
        let decision = infinite.predict(&leaf_png()).unwrap();
        assert_eq!(decision.outcome, GateOutcome::Accepted);
        assert_eq!(decision.prediction.predicted_class, "species_0");
        assert_eq!(decision.prediction.confidence, 1.0);
        assert_eq!(decision.prediction.model_version, "mobilenet-v2");
    }

    #[test]
    fn test_predict_gates_result() {
        let confident = classifier(
            vec![(ArtifactKind::Lightweight, boxed(FixedLogits(vec![10.0, 0.0, 0.0])))],
            3,
            false,
        );
        let decision = confident.predict(&leaf_png()).unwrap();
        assert_eq!(decision.outcome, GateOutcome::Accepted);
        assert_eq!(decision.display_label, "species_0");

        let split = classifier(
            vec![(ArtifactKind::Lightweight, boxed(FixedLogits(vec![3.0, 3.0, -5.0])))],
            3,
            false,
        );
        let decision = split.predict(&leaf_png()).unwrap();
        assert_eq!(decision.outcome, GateOutcome::RejectedLowConfidence);
        assert_eq!(decision.display_label, "Unknown / Not a Medicinal Leaf");
        assert_eq!(decision.prediction.predicted_class, "species_0");
    }

    #[test]
    fn test_from_config_defaults_to_demo() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            models: leaf_id_core::ModelPaths::in_dir(dir.path()),
            ..ServiceConfig::default()
        };
        let clf = SpeciesClassifier::from_config(&config).unwrap().with_seed(3);

        assert_eq!(clf.pool_status().mode, PoolMode::Unloaded);
        assert_eq!(clf.catalog().len(), 5);
        let result = clf.classify(&leaf_png()).unwrap();
        assert_eq!(result.model_version, DEMO_MODEL_VERSION);
        assert_eq!(clf.pool_status().mode, PoolMode::Demo);
    }
}
