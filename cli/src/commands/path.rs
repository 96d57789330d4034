use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct PathCommand {
    #[arg(help = "Backup filename")]
    filename: String,
}

impl PathCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let manager = crate::settings::open_manager(cli).await?;
        let path = manager.resolve_path(&self.filename).await?;
        println!("{}", path.display());
        Ok(())
    }
}
