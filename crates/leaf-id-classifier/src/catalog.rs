//! Class catalog: ordered species labels aligned with model output indices

use leaf_id_common::RecognitionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Labels used when no catalog file is deployed (demo setups only)
const DEFAULT_LABELS: [&str; 5] = [
    "Ocimum_tenuiflorum",
    "Azadirachta_indica",
    "Aloe_vera",
    "Mentha",
    "Tinospora_cordifolia",
];

/// On-disk catalog formats
///
/// Either a plain list (index = position) or a `label -> index` map as
/// written by the training pipeline.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<String>),
    Indexed(HashMap<String, usize>),
}

/// Ordered class labels, index-aligned with every model's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassCatalog {
    labels: Vec<String>,
}

impl ClassCatalog {
    /// Build a catalog from ordered labels
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `labels` is empty
    pub fn new(labels: Vec<String>) -> Result<Self, RecognitionError> {
        if labels.is_empty() {
            return Err(RecognitionError::InvalidConfig(
                "class catalog must contain at least one label".to_string(),
            ));
        }
        Ok(Self { labels })
    }

    /// Built-in five-species catalog
    #[must_use]
    pub fn default_catalog() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Parse a catalog from JSON (list or `label -> index` map)
    pub fn from_json(json: &str) -> Result<Self, RecognitionError> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| RecognitionError::InvalidConfig(format!("invalid class catalog: {e}")))?;

        match file {
            CatalogFile::List(labels) => Self::new(labels),
            CatalogFile::Indexed(map) => {
                let mut slots: Vec<Option<String>> = vec![None; map.len()];
                for (label, index) in map {
                    let slot = slots.get_mut(index).ok_or_else(|| {
                        RecognitionError::InvalidConfig(format!(
                            "class index {index} for {label:?} is out of range"
                        ))
                    })?;
                    if let Some(existing) = slot.replace(label.clone()) {
                        return Err(RecognitionError::InvalidConfig(format!(
                            "class index {index} assigned to both {existing:?} and {label:?}"
                        )));
                    }
                }
                // Every slot is filled: n distinct in-range indices over n slots
                Self::new(slots.into_iter().flatten().collect())
            }
        }
    }

    /// Load a catalog file
    ///
    /// # Errors
    /// `ArtifactMissing` if the file does not exist, `InvalidConfig` if it cannot be parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RecognitionError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RecognitionError::ArtifactMissing(format!(
                "class catalog not found: {}",
                path.display()
            )));
        }
        let catalog = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!("Loaded {} class names from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Load a catalog file, falling back to the built-in catalog when it is
    /// absent and `strict` is off
    pub fn load_or_default(path: impl AsRef<Path>, strict: bool) -> Result<Self, RecognitionError> {
        match Self::load(path.as_ref()) {
            Err(RecognitionError::ArtifactMissing(msg)) if !strict => {
                warn!("{}; using default demo classes", msg);
                Ok(Self::default_catalog())
            }
            other => other,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label at `index`, if within `[0, len)`
    #[must_use]
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}
