use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use walkdir::WalkDir;

/// What to archive and where to put it.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    /// Directory the source paths are relative to.
    pub root: PathBuf,
    /// Relative paths to include. Callers pass only paths that exist.
    pub sources: Vec<PathBuf>,
    /// Compressed archive to create.
    pub output: PathBuf,
    pub timeout: Duration,
}

/// Produces a compressed archive of a set of paths.
///
/// Implementations are tolerant: an archive with some inputs missing or
/// unreadable is still a success. Only failing to run at all, or running past
/// `timeout`, is an error.
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, request: &ArchiveRequest) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// The server state that goes into every backup: `state`, `.env` and each
/// `modules/*/config`, relative to `root`. Paths that do not exist and
/// hidden module directories are left out.
pub async fn collect_sources(root: &Path) -> Vec<PathBuf> {
    let mut sources = Vec::new();

    for candidate in ["state", ".env"] {
        if fs::try_exists(root.join(candidate)).await.unwrap_or(false) {
            sources.push(PathBuf::from(candidate));
        }
    }

    let modules = root.join("modules");
    let module_dirs = tokio::task::spawn_blocking(move || {
        WalkDir::new(modules)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| e.file_name().to_os_string())
            .collect::<Vec<_>>()
    })
    .await
    .unwrap_or_default();

    let mut module_configs = Vec::new();
    for name in module_dirs {
        let config = PathBuf::from("modules").join(name).join("config");
        if fs::try_exists(root.join(&config)).await.unwrap_or(false) {
            module_configs.push(config);
        }
    }
    module_configs.sort();
    sources.extend(module_configs);

    sources
}
