//! Leaf ID CLI - identify medicinal plant species from leaf photos
//!
//! Command-line front end for the leaf identification service.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

use commands::explain::ExplainCommand;
use commands::predict::PredictCommand;
use commands::status::StatusCommand;

#[derive(Parser)]
#[command(
    name = "leaf-id",
    version,
    about = "Identify medicinal plant species from leaf photographs",
    long_about = "Classify leaf photographs with an ensemble of ONNX models, reject\n\
                  low-confidence or ambiguous results, and render visual explanations.\n\n\
                  Without model artifacts (and without --strict) the tool serves demo\n\
                  predictions so the pipeline can be exercised end to end.",
    after_help = "EXAMPLES:\n  \
                  # Identify one or more leaves\n  \
                  leaf-id predict tulsi.jpg neem.png\n\n  \
                  # Fail instead of serving demo predictions\n  \
                  leaf-id --strict predict tulsi.jpg\n\n  \
                  # Render both explanations into ./out\n  \
                  leaf-id explain --method combined --output-dir out tulsi.jpg\n\n  \
                  # Show which model artifacts load\n  \
                  leaf-id status --load\n\n\
                  ENVIRONMENT:\n  \
                  LEAF_ID_MODEL_DIR, LEAF_ID_STRICT_MODE, LEAF_ID_CONFIDENCE_THRESHOLD,\n  \
                  LEAF_ID_GAP_THRESHOLD, LEAF_ID_WORKERS, LEAF_ID_THREADS, RUST_LOG"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the model artifacts and class_names.json
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Fail when no model artifact is available instead of serving demo predictions
    #[arg(long, global = true)]
    strict: bool,

    /// Use the CPU execution provider only
    #[arg(long, global = true)]
    cpu_only: bool,

    /// Seed for demo predictions and heatmap noise
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify leaf images and gate the results
    Predict(PredictCommand),

    /// Render a visual explanation for one image
    Explain(ExplainCommand),

    /// Show configuration and model artifact status
    Status(StatusCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    // RUST_LOG wins over the default level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let options = commands::GlobalOptions {
        config: cli.config,
        model_dir: cli.model_dir,
        strict: cli.strict,
        cpu_only: cli.cpu_only,
        seed: cli.seed,
    };

    match cli.command {
        Commands::Predict(cmd) => cmd.execute(&options).await,
        Commands::Explain(cmd) => cmd.execute(&options).await,
        Commands::Status(cmd) => cmd.execute(&options).await,
    }
}
