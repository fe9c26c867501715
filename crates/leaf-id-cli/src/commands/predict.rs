//! Predict command - classify and gate leaf images

use super::GlobalOptions;
use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use leaf_id_common::GateDecision;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per image
    Text,
    /// Pretty-printed JSON array
    Json,
    /// One JSON object per line
    Jsonl,
}

#[derive(Args)]
pub struct PredictCommand {
    /// Leaf image files
    #[arg(value_name = "IMAGES", required = true)]
    inputs: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Per-image outcome written to stdout
#[derive(Debug, Serialize)]
pub struct PredictionRecord {
    pub input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<GateDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictCommand {
    pub async fn execute(self, options: &GlobalOptions) -> Result<()> {
        let identifier = options.identifier()?;

        let mut images = Vec::with_capacity(self.inputs.len());
        for path in &self.inputs {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            images.push(bytes);
        }

        let start = Instant::now();
        let results = identifier.predict_batch(images).await;

        let records: Vec<PredictionRecord> = self
            .inputs
            .iter()
            .zip(results)
            .map(|(input, result)| match result {
                Ok(decision) => PredictionRecord {
                    input: input.clone(),
                    decision: Some(decision),
                    error: None,
                },
                Err(e) => PredictionRecord {
                    input: input.clone(),
                    decision: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();

        match self.format {
            OutputFormat::Text => {
                for record in &records {
                    println!("{}", format_text(record));
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
            OutputFormat::Jsonl => {
                for record in &records {
                    println!("{}", serde_json::to_string(record)?);
                }
            }
        }

        let failed = records.iter().filter(|r| r.error.is_some()).count();
        info!(
            "Processed {} images in {:.2}s",
            records.len(),
            start.elapsed().as_secs_f64()
        );
        if failed > 0 {
            warn!("{} of {} images failed", failed, records.len());
            anyhow::bail!("{failed} image(s) could not be identified");
        }
        Ok(())
    }
}

fn format_text(record: &PredictionRecord) -> String {
    match (&record.decision, &record.error) {
        (Some(decision), _) => format!(
            "{}: {} [{}] confidence {:.1}%, gap {:.1}% ({})",
            record.input.display(),
            decision.display_label,
            decision.outcome,
            decision.prediction.confidence * 100.0,
            decision.gap * 100.0,
            decision.prediction.model_version
        ),
        (None, Some(error)) => format!("{}: error: {}", record.input.display(), error),
        (None, None) => format!("{}: no result", record.input.display()),
    }
}
