use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of creating a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupResult {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub encrypted: bool,
}

/// A backup found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub filename: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Derived from the `.enc` suffix alone.
    pub encrypted: bool,
}
