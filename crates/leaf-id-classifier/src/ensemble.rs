//! Ensemble combiner
//!
//! Merges per-model probability vectors with a fixed priority ladder:
//!
//! | Available                  | Combination                  | Version tag                        |
//! |----------------------------|------------------------------|------------------------------------|
//! | enhanced + lightweight     | `0.7*enhanced + 0.3*light`   | `efficientnet-mobilenet-ensemble`  |
//! | enhanced                   | pass-through                 | `efficientnet-v2-s`                |
//! | lightweight + transformer  | `(light + transformer) / 2`  | `ensemble-v1.0`                    |
//! | lightweight                | pass-through                 | `mobilenet-v2`                     |
//! | transformer                | pass-through                 | `vit-b16`                          |
//!
//! A transformer vector is ignored whenever the enhanced model answered.

use crate::pool::ArtifactKind;
use leaf_id_common::RecognitionError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const ENHANCED_ENSEMBLE_VERSION: &str = "efficientnet-mobilenet-ensemble";
pub const CLASSIC_ENSEMBLE_VERSION: &str = "ensemble-v1.0";

/// Number of entries in the ranked top-K list
pub const TOP_K: usize = 5;

/// Weights for the two blending rungs of the ladder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleWeights {
    pub enhanced: f32,
    pub enhanced_lightweight: f32,
    pub lightweight: f32,
    pub transformer: f32,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            enhanced: 0.7,
            enhanced_lightweight: 0.3,
            lightweight: 0.5,
            transformer: 0.5,
        }
    }
}

/// `ensemble_weights.json` as written by the training pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightsFile {
    pub mobilenet_weight: Option<f32>,
    pub vit_weight: Option<f32>,
    pub efficientnet_weight: Option<f32>,
}

impl WeightsFile {
    pub fn from_json(json: &str) -> Result<Self, RecognitionError> {
        let file: WeightsFile = serde_json::from_str(json).map_err(|e| {
            RecognitionError::InvalidConfig(format!("invalid ensemble weights: {e}"))
        })?;

        for (name, weight) in [
            ("mobilenet_weight", file.mobilenet_weight),
            ("vit_weight", file.vit_weight),
            ("efficientnet_weight", file.efficientnet_weight),
        ] {
            if let Some(w) = weight {
                if !(0.0..=1.0).contains(&w) {
                    return Err(RecognitionError::InvalidConfig(format!(
                        "{name} must be within [0, 1], got {w}"
                    )));
                }
            }
        }
        Ok(file)
    }

    /// Read the file, `Ok(None)` if it does not exist
    pub fn load(path: &Path) -> Result<Option<Self>, RecognitionError> {
        if !path.exists() {
            return Ok(None);
        }
        Self::from_json(&std::fs::read_to_string(path)?).map(Some)
    }

    /// Override the ladder weights with the values present in this file
    #[must_use]
    pub fn apply(&self, mut weights: EnsembleWeights) -> EnsembleWeights {
        if let Some(w) = self.efficientnet_weight {
            weights.enhanced = w;
            weights.enhanced_lightweight = 1.0 - w;
        }
        if let Some(w) = self.mobilenet_weight {
            weights.lightweight = w;
        }
        if let Some(w) = self.vit_weight {
            weights.transformer = w;
        }
        weights
    }
}

impl EnsembleWeights {
    /// Ladder weights for a deployment
    ///
    /// The weights file is always validated when present, but only changes the
    /// weights when `honor_file` is set.
    pub fn resolve(path: Option<&Path>, honor_file: bool) -> Result<Self, RecognitionError> {
        let defaults = Self::default();
        let Some(path) = path else {
            return Ok(defaults);
        };

        match WeightsFile::load(path)? {
            Some(file) if honor_file => {
                let weights = file.apply(defaults);
                info!("Using ensemble weights from {}: {:?}", path.display(), weights);
                Ok(weights)
            }
            Some(_) => {
                debug!("Ignoring ensemble weights file {}", path.display());
                Ok(defaults)
            }
            None => Ok(defaults),
        }
    }
}

/// Softmax outputs of every model that answered for one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelProbabilities {
    pub lightweight: Option<Vec<f32>>,
    pub transformer: Option<Vec<f32>>,
    pub enhanced: Option<Vec<f32>>,
}

impl ModelProbabilities {
    pub fn insert(&mut self, kind: ArtifactKind, probabilities: Vec<f32>) {
        match kind {
            ArtifactKind::Lightweight => self.lightweight = Some(probabilities),
            ArtifactKind::Transformer => self.transformer = Some(probabilities),
            ArtifactKind::Enhanced => self.enhanced = Some(probabilities),
        }
    }
}

/// Result of walking the ladder
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedProbabilities {
    pub probabilities: Vec<f32>,
    pub model_version: String,
    pub ensemble_used: bool,
}

fn blend(a: &[f32], wa: f32, b: &[f32], wb: f32) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| wa * x + wb * y).collect()
}

fn single(probabilities: &[f32], kind: ArtifactKind) -> CombinedProbabilities {
    CombinedProbabilities {
        probabilities: probabilities.to_vec(),
        model_version: kind.architecture().to_string(),
        ensemble_used: false,
    }
}

/// Combine per-model probabilities, `None` when no model answered
#[must_use]
pub fn combine(
    outputs: &ModelProbabilities,
    weights: &EnsembleWeights,
) -> Option<CombinedProbabilities> {
    let combined = match (&outputs.enhanced, &outputs.lightweight, &outputs.transformer) {
        (Some(enhanced), Some(light), _) => CombinedProbabilities {
            probabilities: blend(enhanced, weights.enhanced, light, weights.enhanced_lightweight),
            model_version: ENHANCED_ENSEMBLE_VERSION.to_string(),
            ensemble_used: true,
        },
        (Some(enhanced), None, _) => single(enhanced, ArtifactKind::Enhanced),
        (None, Some(light), Some(transformer)) => CombinedProbabilities {
            probabilities: blend(light, weights.lightweight, transformer, weights.transformer),
            model_version: CLASSIC_ENSEMBLE_VERSION.to_string(),
            ensemble_used: true,
        },
        (None, Some(light), None) => single(light, ArtifactKind::Lightweight),
        (None, None, Some(transformer)) => single(transformer, ArtifactKind::Transformer),
        (None, None, None) => return None,
    };
    Some(combined)
}

/// Indices of the `k` largest probabilities, descending, ties by ascending index
#[must_use]
pub fn top_k(probabilities: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    // Stable sort keeps ascending index order among equal probabilities
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}
