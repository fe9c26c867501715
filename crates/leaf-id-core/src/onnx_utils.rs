//! ONNX Runtime utilities for optimized model loading
//!
//! This module provides helper functions for creating optimized ONNX Runtime sessions
//! with graph optimizations, execution providers, and performance tuning.

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Error type for ONNX operations
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Failed to create session builder: {0}")]
    SessionBuilderError(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    ModelLoadError { path: String, error: String },

    #[error("Model file not found: {0}")]
    ModelNotFound(String),
}

/// Get the cache directory for compiled CoreML models
///
/// Cache location priority:
/// 1. Environment variable `LEAF_ID_COREML_CACHE_DIR` (if set)
/// 2. `$HOME/.cache/leaf-id/coreml`
/// 3. `$TMPDIR/leaf-id-coreml`
fn get_coreml_cache_dir() -> PathBuf {
    let dir = if let Ok(dir) = std::env::var("LEAF_ID_COREML_CACHE_DIR") {
        PathBuf::from(dir)
    } else if let Ok(home) = std::env::var("HOME") {
        Path::new(&home).join(".cache/leaf-id/coreml")
    } else {
        std::env::temp_dir().join("leaf-id-coreml")
    };

    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Failed to create cache directory {}: {}", dir.display(), e);
    }
    dir
}

/// Intra-op thread count: `LEAF_ID_THREADS` or the number of physical cores
fn intra_threads() -> usize {
    std::env::var("LEAF_ID_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(num_cpus::get_physical)
}

fn base_builder(num_threads: usize) -> Result<SessionBuilder, OnnxError> {
    Session::builder()
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_intra_threads(num_threads)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_memory_pattern(true)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))
}

/// Create an optimized ONNX Runtime session with performance tuning
///
/// Execution providers are tried in order: CoreML, CUDA, CPU. ONNX Runtime
/// silently skips providers that are not available on the host. If CoreML
/// rejects the graph, the session is rebuilt with CUDA/CPU only.
pub fn create_optimized_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    let num_threads = intra_threads();
    let cache_dir = get_coreml_cache_dir();
    let start = Instant::now();

    let session = base_builder(num_threads)?
        .with_execution_providers([
            CoreMLExecutionProvider::default()
                .with_subgraphs(true)
                .with_model_cache_dir(cache_dir.display().to_string())
                .build(),
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path);

    match session {
        Ok(s) => {
            debug!(
                "Session created for {} in {:.3}s ({} threads, CoreML cache {})",
                model_path.display(),
                start.elapsed().as_secs_f64(),
                num_threads,
                cache_dir.display()
            );
            Ok(s)
        }
        Err(e) => {
            let error_msg = e.to_string();
            if !(error_msg.contains("CoreML") || error_msg.contains("MLModel")) {
                return Err(OnnxError::ModelLoadError {
                    path: model_path.display().to_string(),
                    error: error_msg,
                });
            }

            warn!(
                "CoreML failed for {}: {}; retrying with CUDA/CPU",
                model_path.display(),
                error_msg
            );

            base_builder(num_threads)?
                .with_execution_providers([
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e| OnnxError::ModelLoadError {
                    path: model_path.display().to_string(),
                    error: format!("CoreML failed, CPU/CUDA also failed: {}", e),
                })
        }
    }
}

/// Create an ONNX Runtime session with CPU-only execution
pub fn create_cpu_only_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    base_builder(intra_threads())?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| OnnxError::ModelLoadError {
            path: model_path.display().to_string(),
            error: e.to_string(),
        })
}
