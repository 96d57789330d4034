use anyhow::{Context, Result};
use directories::ProjectDirs;
use megastack_backup_core::{BackupConfig, BackupManager};
use std::path::PathBuf;
use tracing::debug;

/// `config.toml` in the platform config directory, e.g.
/// `~/.config/megastack-backup/config.toml` on Linux.
fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "megastack", "megastack-backup")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// `--config`, else the default config file if present, else defaults.
/// `--root` / `MS_ROOT` wins over the file's root.
pub async fn load_config(cli: &crate::Cli) -> Result<BackupConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|path| path.exists()),
    };

    let mut config = match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            BackupConfig::load(&path)
                .await
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => BackupConfig::default(),
    };

    if let Some(root) = &cli.root {
        config.root = root.clone();
    }

    Ok(config)
}

pub async fn open_manager(cli: &crate::Cli) -> Result<BackupManager> {
    let config = load_config(cli).await?;
    debug!("Using MegaStack root {}", config.root.display());
    Ok(BackupManager::new(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn test_root_flag_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "root = \"/opt/megastack\"\ncleanup_delay_secs = 5\n",
        )
        .unwrap();

        let cli = crate::Cli::parse_from([
            "megastack-backup",
            "--config",
            config_path.to_str().unwrap(),
            "--root",
            "/srv/megastack",
            "list",
        ]);
        let config = load_config(&cli).await.unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/megastack"));
        assert_eq!(config.cleanup_delay_secs, 5);
    }

    #[tokio::test]
    async fn test_missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = crate::Cli::parse_from([
            "megastack-backup",
            "--config",
            dir.path().join("absent.toml").to_str().unwrap(),
            "list",
        ]);
        assert!(load_config(&cli).await.is_err());
    }
}
