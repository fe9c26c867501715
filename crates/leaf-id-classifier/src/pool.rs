//! Model runtime pool
//!
//! Owns up to three classifier artifacts and loads them lazily on first use.
//! Loading happens exactly once per pool: concurrent first callers block on a
//! `OnceCell` until the load has settled into one of three modes.
//!
//! - **Ready**: at least one artifact loaded
//! - **Demo**: nothing loaded, strict mode off; callers use synthetic predictions
//! - **Failed**: nothing loaded (or a strict-mode load error); every call reports
//!   `ModelUnavailable`

use leaf_id_common::RecognitionError;
use leaf_id_core::onnx_utils::{create_cpu_only_session, create_optimized_session, OnnxError};
use leaf_id_core::preprocess::{rescale_to_pixel_range, INPUT_SHAPE};
use ndarray::Array4;
use once_cell::sync::OnceCell;
use ort::session::{Session, SessionOutputs};
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Classifier architectures known to the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// MobileNetV2
    Lightweight,
    /// ViT-B/16
    Transformer,
    /// EfficientNetV2-S
    Enhanced,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Lightweight,
        ArtifactKind::Transformer,
        ArtifactKind::Enhanced,
    ];

    /// Architecture name, also used as the single-model version tag
    #[must_use]
    pub fn architecture(self) -> &'static str {
        match self {
            ArtifactKind::Lightweight => "mobilenet-v2",
            ArtifactKind::Transformer => "vit-b16",
            ArtifactKind::Enhanced => "efficientnet-v2-s",
        }
    }

    /// Ensemble priority, higher wins
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            ArtifactKind::Enhanced => 3,
            ArtifactKind::Lightweight => 2,
            ArtifactKind::Transformer => 1,
        }
    }

    /// Whether the artifact expects `[0, 255]` pixels instead of `[-1, 1]`
    #[must_use]
    pub fn expects_pixel_range(self) -> bool {
        self == ArtifactKind::Enhanced
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.architecture())
    }
}

/// Load state of a single artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Loaded,
    Missing,
    Failed(String),
}

/// Descriptor of a configured classifier artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub kind: ArtifactKind,
    pub path: Option<PathBuf>,
    pub state: ArtifactState,
    pub input_shape: [usize; 4],
    pub priority: u8,
}

impl ModelArtifact {
    fn new(kind: ArtifactKind, path: Option<PathBuf>, state: ArtifactState) -> Self {
        Self {
            kind,
            path,
            state,
            input_shape: INPUT_SHAPE,
            priority: kind.priority(),
        }
    }
}

/// Runtime that executes one loaded artifact
pub trait InferenceBackend: Send {
    /// Run a `[1, 3, 224, 224]` tensor and return the raw logits of the single image
    fn run(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, RecognitionError>;
}

/// Turns an artifact path into a runnable backend
pub trait ArtifactLoader: Send + Sync {
    /// # Errors
    /// `ArtifactMissing` when the file is absent; any other error marks the
    /// artifact as failed
    fn load(
        &self,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<Box<dyn InferenceBackend>, RecognitionError>;
}

/// ONNX Runtime backed artifact
pub struct OnnxBackend {
    session: Session,
    output_name: String,
}

impl OnnxBackend {
    pub fn new(session: Session) -> Result<Self, RecognitionError> {
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| {
                RecognitionError::InferenceFailure("model declares no outputs".to_string())
            })?;
        Ok(Self {
            session,
            output_name,
        })
    }
}

impl InferenceBackend for OnnxBackend {
    fn run(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, RecognitionError> {
        let input_tensor = TensorRef::from_array_view(input.view().into_dyn())
            .map_err(|e| RecognitionError::InferenceFailure(e.to_string()))?;

        let outputs: SessionOutputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| RecognitionError::InferenceFailure(e.to_string()))?;

        let (shape, logits) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognitionError::InferenceFailure(e.to_string()))?;

        // Expect [1, num_classes] (or a flat [num_classes])
        let num_classes = match shape.len() {
            1 => shape[0],
            2 if shape[0] == 1 => shape[1],
            _ => {
                return Err(RecognitionError::InferenceFailure(format!(
                    "unexpected output shape {:?}",
                    shape.to_vec()
                )))
            }
        };

        logits
            .get(..num_classes as usize)
            .map(<[f32]>::to_vec)
            .ok_or_else(|| {
                RecognitionError::InferenceFailure("output tensor shorter than its shape".to_string())
            })
    }
}

/// Loads `.onnx` artifacts with the optimized session builder
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxArtifactLoader {
    pub cpu_only: bool,
}

impl ArtifactLoader for OnnxArtifactLoader {
    fn load(
        &self,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<Box<dyn InferenceBackend>, RecognitionError> {
        let session = if self.cpu_only {
            create_cpu_only_session(path)
        } else {
            create_optimized_session(path)
        };

        let session = session.map_err(|e| match e {
            OnnxError::ModelNotFound(p) => RecognitionError::ArtifactMissing(p),
            other => RecognitionError::InferenceFailure(format!("{kind}: {other}")),
        })?;

        Ok(Box::new(OnnxBackend::new(session)?))
    }
}

/// Overall pool mode after loading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMode {
    Unloaded,
    Ready,
    Demo,
    Failed(String),
}

/// Snapshot of the pool for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub mode: PoolMode,
    pub strict_mode: bool,
    pub artifacts: Vec<ModelArtifact>,
}

struct LoadedBackend {
    kind: ArtifactKind,
    backend: Mutex<Box<dyn InferenceBackend>>,
}

struct PoolState {
    mode: PoolMode,
    artifacts: Vec<ModelArtifact>,
    backends: Vec<LoadedBackend>,
}

impl PoolState {
    fn settle(
        artifacts: Vec<ModelArtifact>,
        backends: Vec<LoadedBackend>,
        strict: bool,
        strict_error: Option<String>,
    ) -> Self {
        let mode = if let Some(reason) = strict_error {
            PoolMode::Failed(reason)
        } else if !backends.is_empty() {
            PoolMode::Ready
        } else if strict {
            PoolMode::Failed("no model artifact could be loaded in strict mode".to_string())
        } else {
            PoolMode::Demo
        };

        match &mode {
            PoolMode::Ready => info!(
                "Model pool ready: {}",
                backends
                    .iter()
                    .map(|b| b.kind.architecture())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            PoolMode::Demo => warn!("No model artifacts loaded; serving demo predictions"),
            PoolMode::Failed(reason) => warn!("Model pool unavailable: {}", reason),
            PoolMode::Unloaded => {}
        }

        Self {
            mode,
            artifacts,
            backends,
        }
    }
}

/// Lazily loaded set of classifier artifacts
pub struct ModelRuntimePool {
    configured: Vec<(ArtifactKind, Option<PathBuf>)>,
    strict: bool,
    loader: Box<dyn ArtifactLoader>,
    state: OnceCell<PoolState>,
}

impl ModelRuntimePool {
    /// Create a pool that loads artifacts on first use
    ///
    /// Kinds mapped to `None` are treated as not configured.
    pub fn new(
        configured: Vec<(ArtifactKind, Option<PathBuf>)>,
        strict: bool,
        loader: Box<dyn ArtifactLoader>,
    ) -> Self {
        Self {
            configured,
            strict,
            loader,
            state: OnceCell::new(),
        }
    }

    /// Create an already-loaded pool from in-process backends
    pub fn from_backends(backends: Vec<(ArtifactKind, Box<dyn InferenceBackend>)>, strict: bool) -> Self {
        let artifacts = backends
            .iter()
            .map(|(kind, _)| ModelArtifact::new(*kind, None, ArtifactState::Loaded))
            .collect();
        let backends = backends
            .into_iter()
            .map(|(kind, backend)| LoadedBackend {
                kind,
                backend: Mutex::new(backend),
            })
            .collect();

        Self {
            configured: Vec::new(),
            strict,
            loader: Box::new(OnnxArtifactLoader::default()),
            state: OnceCell::with_value(PoolState::settle(artifacts, backends, strict, None)),
        }
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    fn state(&self) -> &PoolState {
        self.state.get_or_init(|| self.load_all())
    }

    fn load_all(&self) -> PoolState {
        let mut artifacts = Vec::with_capacity(self.configured.len());
        let mut backends = Vec::new();
        let mut strict_error = None;

        for (kind, path) in &self.configured {
            let Some(path) = path else {
                continue;
            };

            let state = match self.loader.load(*kind, path) {
                Ok(backend) => {
                    info!("Loaded {} from {}", kind, path.display());
                    backends.push(LoadedBackend {
                        kind: *kind,
                        backend: Mutex::new(backend),
                    });
                    ArtifactState::Loaded
                }
                Err(RecognitionError::ArtifactMissing(_)) => {
                    info!("{} artifact not found at {}", kind, path.display());
                    ArtifactState::Missing
                }
                Err(e) => {
                    warn!("Failed to load {} from {}: {}", kind, path.display(), e);
                    if self.strict && strict_error.is_none() {
                        strict_error = Some(format!("{kind}: {e}"));
                    }
                    ArtifactState::Failed(e.to_string())
                }
            };

            artifacts.push(ModelArtifact::new(*kind, Some(path.clone()), state));
        }

        PoolState::settle(artifacts, backends, self.strict, strict_error)
    }

    /// Load artifacts if not done yet
    ///
    /// # Errors
    /// `ModelUnavailable` if the pool ended up in the failed mode
    pub fn load(&self) -> Result<(), RecognitionError> {
        match &self.state().mode {
            PoolMode::Failed(reason) => Err(RecognitionError::ModelUnavailable(reason.clone())),
            _ => Ok(()),
        }
    }

    /// True if nothing loaded and demo predictions should be served
    pub fn is_demo(&self) -> Result<bool, RecognitionError> {
        self.load()?;
        Ok(self.state().mode == PoolMode::Demo)
    }

    /// Kinds with a loaded backend, in configuration order
    pub fn loaded_kinds(&self) -> Result<Vec<ArtifactKind>, RecognitionError> {
        self.load()?;
        Ok(self.state().backends.iter().map(|b| b.kind).collect())
    }

    /// Run one artifact and return raw logits
    ///
    /// The enhanced architecture receives the tensor rescaled to `[0, 255]`.
    pub fn run(&self, kind: ArtifactKind, tensor: &Array4<f32>) -> Result<Vec<f32>, RecognitionError> {
        self.load()?;
        let loaded = self
            .state()
            .backends
            .iter()
            .find(|b| b.kind == kind)
            .ok_or_else(|| RecognitionError::ModelUnavailable(format!("{kind} is not loaded")))?;

        let mut backend = loaded.backend.lock().map_err(|e| {
            RecognitionError::InferenceFailure(format!("{kind} backend lock poisoned: {e}"))
        })?;

        let logits = if kind.expects_pixel_range() {
            backend.run(&rescale_to_pixel_range(tensor))?
        } else {
            backend.run(tensor)?
        };

        debug!("{} produced {} logits", kind, logits.len());
        Ok(logits)
    }

    /// Run one artifact and return softmax probabilities
    pub fn probabilities(
        &self,
        kind: ArtifactKind,
        tensor: &Array4<f32>,
    ) -> Result<Vec<f32>, RecognitionError> {
        Ok(softmax(&self.run(kind, tensor)?))
    }

    /// Current status without triggering a load
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        match self.state.get() {
            Some(state) => PoolStatus {
                mode: state.mode.clone(),
                strict_mode: self.strict,
                artifacts: state.artifacts.clone(),
            },
            None => PoolStatus {
                mode: PoolMode::Unloaded,
                strict_mode: self.strict,
                artifacts: Vec::new(),
            },
        }
    }
}

/// Numerically stable softmax: `exp(x_i) / sum_j exp(x_j)`
///
/// `+inf` logits share all of the mass. NaN logits yield NaN probabilities,
/// which callers must reject.
#[must_use]
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let infinite = logits.iter().filter(|&&x| x == f32::INFINITY).count();
    if infinite > 0 {
        let share = 1.0 / infinite as f32;
        return logits
            .iter()
            .map(|&x| if x == f32::INFINITY { share } else { 0.0 })
            .collect();
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
