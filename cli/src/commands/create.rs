use anyhow::{anyhow, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

#[derive(Args)]
pub struct CreateCommand {
    #[arg(long, help = "Keep the archive unencrypted even if a secret is configured")]
    no_encrypt: bool,

    #[arg(long, help = "Output format (text, json)")]
    format: Option<String>,
}

impl CreateCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let format = self.format.as_deref().unwrap_or("text");
        if !matches!(format, "text" | "json") {
            return Err(anyhow!("Unsupported format: {}", format));
        }

        let manager = crate::settings::open_manager(cli).await?;
        info!("Creating backup of {}", manager.root().display());

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Archiving...");
        pb.enable_steady_tick(Duration::from_millis(100));

        let result = manager.create(!self.no_encrypt).await;
        pb.finish_and_clear();
        let backup = result?;

        match format {
            "json" => println!("{}", serde_json::to_string_pretty(&backup)?),
            _ => {
                let kind = if backup.encrypted { "encrypted" } else { "unencrypted" };
                println!(
                    "Created {} backup {} ({:.2} MB)",
                    kind,
                    backup.filename,
                    backup.size as f64 / 1024.0 / 1024.0
                );
                println!("{}", backup.path.display());
            }
        }

        Ok(())
    }
}
