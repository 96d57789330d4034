use anyhow::{anyhow, Result};
use chrono::Local;
use clap::Args;

#[derive(Args)]
pub struct ListCommand {
    #[arg(long, help = "Output format (table, json)")]
    format: Option<String>,

    #[arg(long, help = "Show latest N backups")]
    latest: Option<usize>,
}

impl ListCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let manager = crate::settings::open_manager(cli).await?;
        let format = self.format.as_deref().unwrap_or("table");

        let mut backups = manager.list().await;
        if let Some(latest) = self.latest {
            backups.truncate(latest);
        }

        match format {
            "table" => {
                if backups.is_empty() {
                    println!("No backups found");
                    return Ok(());
                }

                println!("{:<50} {:<20} {:>12} {}", "Filename", "Modified", "Size", "Encrypted");
                println!("{:-<95}", "");

                for backup in backups {
                    println!(
                        "{:<50} {:<20} {:>12} {}",
                        backup.filename,
                        backup.modified.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                        backup.size,
                        if backup.encrypted { "yes" } else { "no" }
                    );
                }
            }
            "json" => {
                println!("{}", serde_json::to_string_pretty(&backups)?);
            }
            _ => {
                return Err(anyhow!("Unsupported format: {}", format));
            }
        }

        Ok(())
    }
}
