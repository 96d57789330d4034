pub mod archive;
pub mod catalog;
pub mod cleanup;
pub mod config;
pub mod crypto;
pub mod error;
pub mod manager;
pub mod naming;
pub mod tar;
pub mod types;

pub use archive::{ArchiveRequest, Archiver};
pub use cleanup::CleanupScheduler;
pub use config::{BackupConfig, EnvSecretSource, KdfParams, SecretSource, StaticSecret};
pub use error::{Error, Result};
pub use manager::BackupManager;
pub use tar::TarArchiver;
pub use types::*;
