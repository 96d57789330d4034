mod commands;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    create::CreateCommand, decrypt::DecryptCommand, list::ListCommand, path::PathCommand,
};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "megastack-backup",
    about = "Encrypted backups of a MegaStack server",
    long_about = "Archives a MegaStack root's state, .env and module configs, encrypts the archive at rest, and lists or decrypts existing backups"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, env = "MS_ROOT", help = "MegaStack root directory")]
    root: Option<PathBuf>,

    #[arg(long, help = "Config file (TOML)")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new backup")]
    Create(CreateCommand),

    #[command(about = "List backups, newest first")]
    List(ListCommand),

    #[command(about = "Print the on-disk path of a backup")]
    Path(PathCommand),

    #[command(about = "Decrypt a backup into a temporary plaintext file")]
    Decrypt(DecryptCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    debug!("Starting megastack-backup");

    match cli.command {
        Commands::Create(ref cmd) => cmd.run(&cli).await,
        Commands::List(ref cmd) => cmd.run(&cli).await,
        Commands::Path(ref cmd) => cmd.run(&cli).await,
        Commands::Decrypt(ref cmd) => cmd.run(&cli).await,
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!("megastack_backup={}", level)))
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}
