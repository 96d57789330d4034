use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

#[derive(Args)]
pub struct DecryptCommand {
    #[arg(help = "Encrypted backup filename (.tar.gz.enc)")]
    filename: String,

    #[arg(long, help = "Exit right away and leave the plaintext behind")]
    detach: bool,
}

impl DecryptCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let manager = crate::settings::open_manager(cli).await?;
        let path = manager.decrypt(&self.filename).await?;
        println!("{}", path.display());

        if self.detach {
            manager.cleanup().cancel_all();
            warn!("Plaintext left at {}; remove it when done", path.display());
            return Ok(());
        }

        let delay = manager.cleanup().delay();
        info!(
            "Plaintext is removed in {}s; press Ctrl-C to remove it now",
            delay.as_secs()
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; removing plaintext");
            }
        }
        manager.cleanup().flush().await;

        Ok(())
    }
}
