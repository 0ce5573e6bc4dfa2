use crate::render;
use anyhow::Result;
use clap::Args;
use tm_core::resources::{ResourceSampler, SystemSampler};

/// Arguments for showing resource usage
#[derive(Args)]
pub struct ResourcesArgs {
    /// Print the sample as JSON
    #[arg(long)]
    pub json: bool,
}

impl ResourcesArgs {
    pub fn run(self) -> Result<()> {
        let snapshot = SystemSampler::new().sample();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        } else {
            println!("{}", render::resource_summary(&snapshot));
        }
        Ok(())
    }
}
