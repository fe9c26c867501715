//! Medicinal leaf identification
//!
//! Facade over the workspace crates. Most callers only need
//! [`LeafIdentifier`] and [`ServiceConfig`].

pub use leaf_id_classifier as classifier;
pub use leaf_id_common as common;
pub use leaf_id_explain as explain;

pub use leaf_id_common::{
    ExplanationResult, GateDecision, GateOutcome, PredictionResult, RecognitionError,
};
pub use leaf_id_core::{config, image_io, preprocess, GateConfig, ModelPaths, ServiceConfig};
pub use leaf_id_service::{LeafIdentifier, LeafIdentifierBuilder, ServiceStatus};
