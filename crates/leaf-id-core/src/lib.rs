//! Leaf ID Core - configuration, image I/O and tensor preparation
//!
//! This crate holds the pieces shared by the classifier and the explanation
//! renderers: service configuration, decoding of uploaded bytes, PNG data-URI
//! encoding, the `[1, 3, 224, 224]` preprocessing pipeline and ONNX session
//! construction.

pub mod config;
pub mod image_io;
pub mod onnx_utils;
pub mod preprocess;

pub use config::{EnsembleSettings, GateConfig, ModelPaths, ServiceConfig};
pub use image_io::ImageError;
pub use onnx_utils::OnnxError;
pub use preprocess::{preprocess_image, INPUT_SHAPE, INPUT_SIZE};
