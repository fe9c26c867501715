//! Service configuration
//!
//! Configuration is read from an optional YAML file and then overridden by
//! `LEAF_ID_*` environment variables. Every field has a default that matches
//! the standard `./ml_models` deployment layout, so an empty file (or no file
//! at all) yields a working demo-mode setup.
//!
//! ```yaml
//! strict_mode: false
//! workers: 4
//! models:
//!   lightweight: ./ml_models/mobilenetv2_best.onnx
//!   enhanced: ./ml_models/efficientnetv2_best.onnx
//!   class_catalog: ./ml_models/class_names.json
//! gate:
//!   confidence_threshold: 0.65
//!   gap_threshold: 0.15
//! ```

use leaf_id_common::RecognitionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default directory holding model artifacts and the class catalog
pub const DEFAULT_MODEL_DIR: &str = "./ml_models";

pub const LIGHTWEIGHT_MODEL_FILE: &str = "mobilenetv2_best.onnx";
pub const TRANSFORMER_MODEL_FILE: &str = "vit_best.onnx";
pub const ENHANCED_MODEL_FILE: &str = "efficientnetv2_best.onnx";
pub const CLASS_CATALOG_FILE: &str = "class_names.json";
pub const ENSEMBLE_WEIGHTS_FILE: &str = "ensemble_weights.json";

/// Default number of concurrent inference workers
pub const DEFAULT_WORKERS: usize = 4;

/// Top-level configuration for the identification service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub models: ModelPaths,
    /// Fail instead of falling back to demo predictions
    pub strict_mode: bool,
    pub gate: GateConfig,
    pub ensemble: EnsembleSettings,
    /// Size of the bounded inference worker pool
    pub workers: usize,
    /// Skip hardware execution providers when creating ONNX sessions
    pub cpu_only: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            models: ModelPaths::default(),
            strict_mode: false,
            gate: GateConfig::default(),
            ensemble: EnsembleSettings::default(),
            workers: DEFAULT_WORKERS,
            cpu_only: false,
        }
    }
}

/// Locations of the model artifacts and catalog files
///
/// A `None` artifact path means the architecture is not configured at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub lightweight: Option<PathBuf>,
    pub transformer: Option<PathBuf>,
    pub enhanced: Option<PathBuf>,
    pub class_catalog: PathBuf,
    pub ensemble_weights: Option<PathBuf>,
}

impl ModelPaths {
    /// Standard file names inside `model_dir`
    pub fn in_dir(model_dir: impl AsRef<Path>) -> Self {
        let dir = model_dir.as_ref();
        Self {
            lightweight: Some(dir.join(LIGHTWEIGHT_MODEL_FILE)),
            transformer: Some(dir.join(TRANSFORMER_MODEL_FILE)),
            enhanced: Some(dir.join(ENHANCED_MODEL_FILE)),
            class_catalog: dir.join(CLASS_CATALOG_FILE),
            ensemble_weights: Some(dir.join(ENSEMBLE_WEIGHTS_FILE)),
        }
    }
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self::in_dir(DEFAULT_MODEL_DIR)
    }
}

/// Thresholds used by the confidence gate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum top-1 probability for acceptance
    pub confidence_threshold: f32,
    /// Minimum top-1 minus top-2 probability for acceptance
    pub gap_threshold: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.65,
            gap_threshold: 0.15,
        }
    }
}

/// Ensemble behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleSettings {
    /// Apply weights from the ensemble-weights file instead of the ladder constants
    pub honor_weights_file: bool,
}

impl ServiceConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, RecognitionError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: ServiceConfig = serde_yaml::from_str(&contents).map_err(|e| {
            RecognitionError::InvalidConfig(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the YAML file (if given), apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self, RecognitionError> {
        let config = match path {
            Some(path) => Self::from_yaml(path)?,
            None => Self::default(),
        };
        let config = config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LEAF_ID_*` overrides from the process environment
    pub fn apply_env_overrides(self) -> Result<Self, RecognitionError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    ///
    /// Recognized keys: `LEAF_ID_MODEL_DIR`, `LEAF_ID_STRICT_MODE`,
    /// `LEAF_ID_CONFIDENCE_THRESHOLD`, `LEAF_ID_GAP_THRESHOLD`, `LEAF_ID_WORKERS`.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Result<Self, RecognitionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("LEAF_ID_MODEL_DIR") {
            self.models = ModelPaths::in_dir(dir);
        }
        if let Some(value) = lookup("LEAF_ID_STRICT_MODE") {
            self.strict_mode = parse_flag("LEAF_ID_STRICT_MODE", &value)?;
        }
        if let Some(value) = lookup("LEAF_ID_CONFIDENCE_THRESHOLD") {
            self.gate.confidence_threshold = parse_value("LEAF_ID_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("LEAF_ID_GAP_THRESHOLD") {
            self.gate.gap_threshold = parse_value("LEAF_ID_GAP_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("LEAF_ID_WORKERS") {
            self.workers = parse_value("LEAF_ID_WORKERS", &value)?;
        }
        Ok(self)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), RecognitionError> {
        for (name, value) in [
            ("confidence_threshold", self.gate.confidence_threshold),
            ("gap_threshold", self.gate.gap_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RecognitionError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.workers == 0 {
            return Err(RecognitionError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, RecognitionError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RecognitionError::InvalidConfig(format!(
            "{key}: expected a boolean, got {other:?}"
        ))),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, RecognitionError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| RecognitionError::InvalidConfig(format!("{key}: {e}")))
}
