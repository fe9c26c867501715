//! Status command - report configuration and artifact load state

use super::GlobalOptions;
use anyhow::Result;
use clap::Args;
use serde_json::json;

#[derive(Args)]
pub struct StatusCommand {
    /// Load the model artifacts before reporting
    #[arg(long)]
    load: bool,
}

impl StatusCommand {
    pub async fn execute(self, options: &GlobalOptions) -> Result<()> {
        let config = options.service_config()?;
        let identifier = options.identifier()?;

        // A strict-mode load failure is still reported through the pool status
        let load_error = if self.load {
            identifier.warm_up().await.err().map(|e| e.to_string())
        } else {
            None
        };

        let output = json!({
            "config": config,
            "status": identifier.status(),
            "load_error": load_error,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}
