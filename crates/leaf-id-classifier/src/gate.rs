//! Confidence gate: accept or reject a prediction for display

use leaf_id_common::{GateDecision, GateOutcome, PredictionResult, AMBIGUOUS_LABEL, LOW_CONFIDENCE_LABEL};
use leaf_id_core::GateConfig;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfidenceGate {
    config: GateConfig,
}

impl ConfidenceGate {
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> GateConfig {
        self.config
    }

    /// Decision rule on raw scores
    #[must_use]
    pub fn evaluate_scores(&self, confidence: f32, gap: f32) -> GateOutcome {
        if confidence >= self.config.confidence_threshold && gap >= self.config.gap_threshold {
            GateOutcome::Accepted
        } else if confidence < self.config.confidence_threshold {
            GateOutcome::RejectedLowConfidence
        } else {
            GateOutcome::RejectedAmbiguous
        }
    }

    /// Gate a prediction, keeping it intact for audit
    #[must_use]
    pub fn evaluate(&self, prediction: PredictionResult) -> GateDecision {
        let gap = prediction.top_gap();
        let outcome = self.evaluate_scores(prediction.confidence, gap);

        let display_label = match outcome {
            GateOutcome::Accepted => prediction.predicted_class.clone(),
            GateOutcome::RejectedLowConfidence => LOW_CONFIDENCE_LABEL.to_string(),
            GateOutcome::RejectedAmbiguous => AMBIGUOUS_LABEL.to_string(),
        };

        debug!(
            "Gate {} for {} (confidence {:.3}, gap {:.3})",
            outcome, prediction.predicted_class, prediction.confidence, gap
        );

        GateDecision {
            outcome,
            display_label,
            gap,
            prediction,
        }
    }
}
