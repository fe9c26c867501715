//! Subcommand implementations

pub mod explain;
pub mod predict;
pub mod status;

use anyhow::{Context as _, Result};
use leaf_id_core::{ModelPaths, ServiceConfig};
use leaf_id_service::LeafIdentifier;
use std::path::PathBuf;
use tracing::debug;

/// Options shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub strict: bool,
    pub cpu_only: bool,
    pub seed: Option<u64>,
}

impl GlobalOptions {
    /// Configuration file and environment, then command-line flags on top
    pub fn service_config(&self) -> Result<ServiceConfig> {
        let mut config = ServiceConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(dir) = &self.model_dir {
            config.models = ModelPaths::in_dir(dir);
        }
        if self.strict {
            config.strict_mode = true;
        }
        if self.cpu_only {
            config.cpu_only = true;
        }

        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }

    pub fn identifier(&self) -> Result<LeafIdentifier> {
        let mut builder = LeafIdentifier::builder(self.service_config()?);
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        builder
            .build()
            .context("Failed to initialize leaf identifier")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf-id.yaml");
        std::fs::write(&path, "strict_mode: false\nworkers: 2\n").unwrap();

        let options = GlobalOptions {
            config: Some(path),
            model_dir: Some(dir.path().join("models")),
            strict: true,
            ..GlobalOptions::default()
        };
        let config = options.service_config().unwrap();

        assert!(config.strict_mode);
        assert_eq!(config.workers, 2);
        assert_eq!(
            config.models.class_catalog,
            dir.path().join("models").join("class_names.json")
        );
    }

    #[test]
    fn test_missing_config_file() {
        let options = GlobalOptions {
            config: Some(PathBuf::from("/nonexistent/leaf-id.yaml")),
            ..GlobalOptions::default()
        };
        assert!(options.service_config().is_err());
    }
}
