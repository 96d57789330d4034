use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No backup encryption secret configured (set MS_BACKUP_KEY or MS_SESSION_SECRET)")]
    NoSecret,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid backup filename")]
    InvalidFilename,

    #[error("Backup not found: {filename}")]
    NotFound { filename: String },

    #[error("File is not encrypted: {filename}")]
    NotEncrypted { filename: String },

    #[error("Refusing to overwrite existing file: {filename}")]
    AlreadyExists { filename: String },

    #[error("Backup failed authentication: wrong key or corrupted data")]
    Integrity,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Archiving timed out after {secs}s")]
    ArchiveTimeout { secs: u64 },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
