//! Visual explanations for leaf predictions
//!
//! Two independent strategies render an explanation from the original image
//! bytes:
//!
//! - [`heatmap`]: approximate saliency heatmap ("Grad-CAM" style) with a JET
//!   overlay and the raw heat field
//! - [`segments`]: grid segment attribution ("LIME" style) with a green tint
//!   over the supporting segments and ranked feature contributions
//!
//! Neither strategy looks at the predicted class; the prediction is copied into
//! the result for display only. Decode failures are always returned to the
//! caller, there is no fallback rendering.
//!
//! # Example
//! ```no_run
//! use leaf_id_explain::ExplanationRenderer;
//! # use leaf_id_common::PredictionResult;
//!
//! # fn main() -> anyhow::Result<()> {
//! # let prediction: PredictionResult = unimplemented!();
//! let renderer = ExplanationRenderer::with_seed(7);
//! let bytes = std::fs::read("leaf.jpg")?;
//! let explanation = renderer.heatmap(&bytes, &prediction)?;
//! println!("{}: {}", explanation.method, explanation.explanation);
//! # Ok(())
//! # }
//! ```

pub mod colormap;
pub mod heatmap;
pub mod segments;

pub use heatmap::{render_heatmap, HEATMAP_CAPTION};
pub use segments::{render_segments, SegmentGrid, SEGMENTS_CAPTION, SEGMENT_SIZE};

use leaf_id_common::{CombinedExplanation, ExplanationResult, PredictionResult, RecognitionError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

/// Explanation renderer owning the heatmap noise source
pub struct ExplanationRenderer {
    rng: Mutex<StdRng>,
}

impl Default for ExplanationRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplanationRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Renderer with reproducible heatmap noise
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn heatmap(
        &self,
        bytes: &[u8],
        prediction: &PredictionResult,
    ) -> Result<ExplanationResult, RecognitionError> {
        let start = Instant::now();
        // Hold the shared source only long enough to draw a per-call seed
        let seed = self
            .rng
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .random::<u64>();
        let result = render_heatmap(bytes, prediction, &mut StdRng::seed_from_u64(seed))?;
        debug!("Heatmap rendered in {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok(result)
    }

    pub fn segments(
        &self,
        bytes: &[u8],
        prediction: &PredictionResult,
    ) -> Result<ExplanationResult, RecognitionError> {
        let start = Instant::now();
        let result = render_segments(bytes, prediction)?;
        debug!("Segments rendered in {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok(result)
    }

    /// Both strategies for the same input
    pub fn combined(
        &self,
        bytes: &[u8],
        prediction: &PredictionResult,
    ) -> Result<CombinedExplanation, RecognitionError> {
        Ok(CombinedExplanation {
            heatmap: self.heatmap(bytes, prediction)?,
            segments: self.segments(bytes, prediction)?,
        })
    }
}
