use crate::context::CliContext;
use anyhow::{Context, Result};
use clap::Subcommand;
use tm_core::TaskManagerConfig;

/// Configuration commands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a default config.json and create the state directories
    Init {
        /// Overwrite an existing config.json
        #[arg(long)]
        force: bool,
    },
    /// Show the resolved configuration
    Show,
}

impl ConfigCommands {
    pub fn run(self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommands::Init { force } => {
                let config = TaskManagerConfig::with_root(ctx.root());
                config.ensure_dirs().context("Failed to create state directories")?;

                let path = config.settings_path();
                if path.exists() && !force {
                    println!("Configuration already exists at {}", path.display());
                    return Ok(());
                }
                config
                    .settings()
                    .save(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Wrote default configuration to {}", path.display());
                Ok(())
            }
            ConfigCommands::Show => {
                let config = ctx.config();
                println!("Root:          {}", config.root_dir.display());
                println!("Registry:      {}", config.registry_path().display());
                println!("Logs:          {}", config.logs_dir().display());
                println!("Settings:      {}", config.settings_path().display());
                println!("Backend:       {}", config.mux_backend);
                println!("Grace period:  {} ms", config.grace_period.as_millis());
                println!(
                    "Finalizer:     {}",
                    config
                        .finalize_program
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                println!("{}", serde_json::to_string_pretty(&config.settings())?);
                Ok(())
            }
        }
    }
}
