use crate::context::CliContext;
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tm_core::{NotificationSettings, Settings};

/// Notification settings commands
#[derive(Subcommand)]
pub enum NotifyCommands {
    /// Show the current notification settings
    Show,
    /// Announce finished tasks
    Enable,
    /// Stop announcing finished tasks
    Disable,
    /// Send a test event through the configured channels
    Test,
    /// POST completion events as JSON to URL
    SetWebhook {
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Run a shell command per event, with TM_TASK_* variables set
    SetHook {
        #[arg(value_name = "COMMAND")]
        command: String,
    },
    /// Remove the webhook and hook
    Clear,
}

impl NotifyCommands {
    pub fn run(self, ctx: &CliContext) -> Result<()> {
        let path = ctx.config().settings_path();
        let mut settings = Settings::load(&path);

        match self {
            NotifyCommands::Show => {
                println!("{}", describe(&settings.notify));
                return Ok(());
            }
            NotifyCommands::Test => {
                if !settings.notify.enabled {
                    println!("Notifications are disabled; enable them with `tm notify enable`");
                    return Ok(());
                }
                ctx.controller()?
                    .send_test_notification()
                    .context("Test notification failed")?;
                println!("Test notification sent");
                return Ok(());
            }
            NotifyCommands::Enable => settings.notify.enabled = true,
            NotifyCommands::Disable => settings.notify.enabled = false,
            NotifyCommands::SetWebhook { url } => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    bail!("Webhook URL must start with http:// or https://");
                }
                settings.notify.webhook_url = Some(url);
            }
            NotifyCommands::SetHook { command } => {
                if command.trim().is_empty() {
                    bail!("Hook command cannot be empty");
                }
                settings.notify.hook_command = Some(command);
            }
            NotifyCommands::Clear => {
                settings.notify.webhook_url = None;
                settings.notify.hook_command = None;
            }
        }

        settings
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{}", describe(&settings.notify));
        Ok(())
    }
}

fn describe(notify: &NotificationSettings) -> String {
    format!(
        "Notifications: {}\nWebhook:       {}\nHook:          {}\nTimeout:       {}s",
        if notify.enabled { "enabled" } else { "disabled" },
        notify.webhook_url.as_deref().unwrap_or("-"),
        notify.hook_command.as_deref().unwrap_or("-"),
        notify.timeout_secs
    )
}
