//! Leaf identification service
//!
//! Composition root of the identification core. A [`LeafIdentifier`] owns the
//! ensemble classifier, the explanation renderer and a bounded worker pool, and
//! exposes async entry points that dispatch the CPU-bound work onto it.
//!
//! ```no_run
//! use leaf_id_core::ServiceConfig;
//! use leaf_id_service::LeafIdentifier;
//!
//! # async fn run() -> Result<(), leaf_id_common::RecognitionError> {
//! let identifier = LeafIdentifier::new(ServiceConfig::load(None)?)?;
//! let bytes = std::fs::read("leaf.jpg")?;
//!
//! let decision = identifier.predict(bytes.clone()).await?;
//! let heatmap = identifier.explain_heatmap(bytes, decision.prediction.clone()).await?;
//! # Ok(())
//! # }
//! ```

pub mod worker;

pub use worker::WorkerPool;

use leaf_id_classifier::{PoolStatus, SpeciesClassifier};
use leaf_id_common::{
    CombinedExplanation, ExplanationResult, GateDecision, PredictionResult, RecognitionError,
};
use leaf_id_core::ServiceConfig;
use leaf_id_explain::ExplanationRenderer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Diagnostics snapshot of a running service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub pool: PoolStatus,
    pub classes: usize,
    pub workers: usize,
    pub confidence_threshold: f32,
    pub gap_threshold: f32,
}

/// Leaf identification entry point
pub struct LeafIdentifier {
    classifier: Arc<SpeciesClassifier>,
    renderer: Arc<ExplanationRenderer>,
    workers: WorkerPool,
}

impl LeafIdentifier {
    /// Build the service from configuration
    ///
    /// # Errors
    /// `InvalidConfig` for an invalid configuration, catalog or weights file
    pub fn new(config: ServiceConfig) -> Result<Self, RecognitionError> {
        LeafIdentifierBuilder::new(config).build()
    }

    #[must_use]
    pub fn builder(config: ServiceConfig) -> LeafIdentifierBuilder {
        LeafIdentifierBuilder::new(config)
    }

    /// Assemble a service from already-built parts
    #[must_use]
    pub fn from_parts(
        classifier: SpeciesClassifier,
        renderer: ExplanationRenderer,
        workers: usize,
    ) -> Self {
        Self {
            classifier: Arc::new(classifier),
            renderer: Arc::new(renderer),
            workers: WorkerPool::new(workers),
        }
    }

    /// Load model artifacts ahead of the first request
    pub async fn warm_up(&self) -> Result<(), RecognitionError> {
        let classifier = self.classifier.clone();
        self.workers.run(move || classifier.warm_up()).await
    }

    /// Classify and gate one image
    pub async fn predict(&self, bytes: Vec<u8>) -> Result<GateDecision, RecognitionError> {
        let classifier = self.classifier.clone();
        self.workers.run(move || classifier.predict(&bytes)).await
    }

    /// Classify and gate several images
    ///
    /// One entry per input in input order; a failing image never fails the
    /// other entries.
    pub async fn predict_batch(
        &self,
        images: Vec<Vec<u8>>,
    ) -> Vec<Result<GateDecision, RecognitionError>> {
        let start = Instant::now();
        let total = images.len();
        let mut results = Vec::with_capacity(total);

        for (index, bytes) in images.into_iter().enumerate() {
            let result = self.predict(bytes).await;
            if let Err(e) = &result {
                warn!("Batch item {} failed: {}", index, e);
            }
            results.push(result);
        }

        info!(
            "Batch of {} images processed in {:.2}s ({} failed)",
            total,
            start.elapsed().as_secs_f64(),
            results.iter().filter(|r| r.is_err()).count()
        );
        results
    }

    pub async fn explain_heatmap(
        &self,
        bytes: Vec<u8>,
        prediction: PredictionResult,
    ) -> Result<ExplanationResult, RecognitionError> {
        let renderer = self.renderer.clone();
        self.workers
            .run(move || renderer.heatmap(&bytes, &prediction))
            .await
    }

    pub async fn explain_segments(
        &self,
        bytes: Vec<u8>,
        prediction: PredictionResult,
    ) -> Result<ExplanationResult, RecognitionError> {
        let renderer = self.renderer.clone();
        self.workers
            .run(move || renderer.segments(&bytes, &prediction))
            .await
    }

    /// Both explanation strategies for one image
    pub async fn explain_combined(
        &self,
        bytes: Vec<u8>,
        prediction: PredictionResult,
    ) -> Result<CombinedExplanation, RecognitionError> {
        let renderer = self.renderer.clone();
        self.workers
            .run(move || renderer.combined(&bytes, &prediction))
            .await
    }

    /// Per-artifact load state; does not trigger loading
    #[must_use]
    pub fn pool_status(&self) -> PoolStatus {
        self.classifier.pool_status()
    }

    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        let gate = self.classifier.gate().config();
        ServiceStatus {
            pool: self.pool_status(),
            classes: self.classifier.catalog().len(),
            workers: self.workers.size(),
            confidence_threshold: gate.confidence_threshold,
            gap_threshold: gate.gap_threshold,
        }
    }
}

/// Builder for [`LeafIdentifier`]
pub struct LeafIdentifierBuilder {
    config: ServiceConfig,
    seed: Option<u64>,
}

impl LeafIdentifierBuilder {
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self { config, seed: None }
    }

    /// Seed demo predictions and heatmap noise for reproducible output
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<LeafIdentifier, RecognitionError> {
        self.config.validate()?;

        let classifier = SpeciesClassifier::from_config(&self.config)?;
        let (classifier, renderer) = match self.seed {
            Some(seed) => (classifier.with_seed(seed), ExplanationRenderer::with_seed(seed)),
            None => (classifier, ExplanationRenderer::new()),
        };

        info!(
            "Leaf identifier ready ({} workers, strict mode: {})",
            self.config.workers, self.config.strict_mode
        );
        Ok(LeafIdentifier::from_parts(
            classifier,
            renderer,
            self.config.workers,
        ))
    }
}
