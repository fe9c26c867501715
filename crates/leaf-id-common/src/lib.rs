/// Common types and utilities for leaf identification
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Display label used when the top-1 confidence is below the threshold
pub const LOW_CONFIDENCE_LABEL: &str = "Unknown / Not a Medicinal Leaf";

/// Display label used when the top-1/top-2 gap is too small
pub const AMBIGUOUS_LABEL: &str = "Ambiguous Input / Multiple Species Detected";

/// Recognition errors
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Model artifact missing: {0}")]
    ArtifactMissing(String),

    #[error("No model available: {0}")]
    ModelUnavailable(String),

    #[error("Inference failed: {0}")]
    InferenceFailure(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to render explanation: {0}")]
    RenderFailure(String),

    #[error("Worker dispatch failed: {0}")]
    Dispatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for RecognitionError {
    fn from(err: image::ImageError) -> Self {
        RecognitionError::InvalidImage(err.to_string())
    }
}

/// Result type for recognition operations
pub type Result<T> = std::result::Result<T, RecognitionError>;

/// One entry of the ranked top-K list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPrediction {
    pub class_name: String,
    pub class_index: usize,
    pub confidence: f32,
}

/// Outcome of a single classification call, before gating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_class: String,
    pub predicted_class_index: usize,
    /// Max probability of the combined vector (0.0-1.0)
    pub confidence: f32,
    /// Sorted descending by confidence, ties by ascending class index
    pub top_predictions: Vec<TopPrediction>,
    pub model_version: String,
    pub ensemble_used: bool,
    pub processing_time_ms: f64,
}

impl PredictionResult {
    /// Difference between the top-1 and top-2 confidences.
    ///
    /// Returns 1.0 when fewer than two predictions are available.
    #[must_use]
    pub fn top_gap(&self) -> f32 {
        match self.top_predictions.as_slice() {
            [first, second, ..] => first.confidence - second.confidence,
            _ => 1.0,
        }
    }
}

/// Gate outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Accepted,
    RejectedLowConfidence,
    RejectedAmbiguous,
}

impl GateOutcome {
    #[must_use]
    pub fn is_accepted(self) -> bool {
        self == GateOutcome::Accepted
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateOutcome::Accepted => write!(f, "accepted"),
            GateOutcome::RejectedLowConfidence => write!(f, "rejected_low_confidence"),
            GateOutcome::RejectedAmbiguous => write!(f, "rejected_ambiguous"),
        }
    }
}

/// Accept/reject decision wrapping the full prediction for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub outcome: GateOutcome,
    /// Predicted class when accepted, sentinel label otherwise
    pub display_label: String,
    pub gap: f32,
    pub prediction: PredictionResult,
}

/// Explanation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationKind {
    Heatmap,
    SegmentAttribution,
}

impl ExplanationKind {
    /// Method name shown to end users
    #[must_use]
    pub fn method_name(self) -> &'static str {
        match self {
            ExplanationKind::Heatmap => "Grad-CAM",
            ExplanationKind::SegmentAttribution => "LIME",
        }
    }
}

/// Named image feature with its illustrative contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttribution {
    pub feature: String,
    pub importance: f32,
    pub positive: bool,
}

/// Rendered explanation for one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationResult {
    pub kind: ExplanationKind,
    pub method: String,
    pub predicted_class: String,
    pub confidence: f32,
    /// `data:image/png;base64,...`
    pub overlay: String,
    /// Raw heatmap (heatmap strategy only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub top_features: Vec<FeatureAttribution>,
    pub explanation: String,
}

/// Both explanation strategies rendered for the same input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedExplanation {
    pub heatmap: ExplanationResult,
    pub segments: ExplanationResult,
}
