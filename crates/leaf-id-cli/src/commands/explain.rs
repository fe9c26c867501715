//! Explain command - classify one image and render its visual explanation

use super::GlobalOptions;
use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use leaf_id_common::ExplanationResult;
use leaf_id_core::image_io::decode_data_uri;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// Saliency heatmap overlay
    Heatmap,
    /// Segment attribution overlay
    Segments,
    /// Both strategies
    Combined,
}

#[derive(Args)]
pub struct ExplainCommand {
    /// Leaf image file
    #[arg(value_name = "IMAGE")]
    input: PathBuf,

    /// Explanation strategy
    #[arg(short, long, value_enum, default_value = "heatmap")]
    method: Method,

    /// Write the rendered PNGs into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl ExplainCommand {
    pub async fn execute(self, options: &GlobalOptions) -> Result<()> {
        let identifier = options.identifier()?;
        let bytes = tokio::fs::read(&self.input)
            .await
            .with_context(|| format!("Failed to read {}", self.input.display()))?;

        let decision = identifier
            .predict(bytes.clone())
            .await
            .context("Prediction failed")?;
        info!(
            "{} -> {} ({})",
            self.input.display(),
            decision.display_label,
            decision.outcome
        );

        let explanations = match self.method {
            Method::Heatmap => vec![identifier
                .explain_heatmap(bytes, decision.prediction.clone())
                .await
                .context("Heatmap rendering failed")?],
            Method::Segments => vec![identifier
                .explain_segments(bytes, decision.prediction.clone())
                .await
                .context("Segment rendering failed")?],
            Method::Combined => {
                let combined = identifier
                    .explain_combined(bytes, decision.prediction.clone())
                    .await
                    .context("Explanation rendering failed")?;
                vec![combined.heatmap, combined.segments]
            }
        };

        let mut written = Vec::new();
        if let Some(dir) = &self.output_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let stem = self
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "leaf".to_string());
            for explanation in &explanations {
                written.extend(write_images(dir, &stem, explanation).await?);
            }
        }

        // Data URIs are large; only print them when nothing was written to disk
        let rendered: Vec<serde_json::Value> = explanations
            .iter()
            .map(|e| {
                let mut value = serde_json::to_value(e)?;
                if self.output_dir.is_some() {
                    if let Some(obj) = value.as_object_mut() {
                        obj.remove("overlay");
                        obj.remove("heatmap");
                    }
                }
                Ok(value)
            })
            .collect::<Result<_, serde_json::Error>>()?;

        let output = json!({
            "input": self.input,
            "decision": decision,
            "explanations": rendered,
            "files": written,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

/// File name for an explanation image, e.g. `tulsi_lime_overlay.png`
pub fn image_file_name(stem: &str, explanation: &ExplanationResult, part: &str) -> String {
    format!(
        "{}_{}_{}.png",
        stem,
        explanation.method.to_lowercase().replace('-', ""),
        part
    )
}

async fn write_images(dir: &Path, stem: &str, explanation: &ExplanationResult) -> Result<Vec<PathBuf>> {
    let mut images = vec![("overlay", explanation.overlay.as_str())];
    if let Some(heatmap) = &explanation.heatmap {
        images.push(("heatmap", heatmap.as_str()));
    }

    let mut written = Vec::with_capacity(images.len());
    for (part, uri) in images {
        let png = decode_data_uri(uri).context("Renderer returned an invalid data URI")?;
        let path = dir.join(image_file_name(stem, explanation, part));
        tokio::fs::write(&path, png)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
