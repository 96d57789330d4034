//! Backup filename conventions.
//!
//! `megastack-backup-<YYYY-MM-DDTHH-mm-ss>.tar.gz[.enc]`

use chrono::{DateTime, Utc};
use std::path::Path;

pub const BACKUP_PREFIX: &str = "megastack-backup-";
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
pub const ENCRYPTED_SUFFIX: &str = ".tar.gz.enc";

/// ISO-8601 with `:` and `.` replaced by `-`, cut at whole seconds.
pub fn timestamp(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H-%M-%S").to_string()
}

pub fn archive_name(time: DateTime<Utc>) -> String {
    format!("{}{}{}", BACKUP_PREFIX, timestamp(time), ARCHIVE_SUFFIX)
}

pub fn encrypted_name(archive_name: &str) -> String {
    format!("{}.enc", archive_name)
}

/// Name of the plaintext sibling an encrypted backup decrypts to.
pub fn plaintext_name(encrypted_name: &str) -> Option<&str> {
    encrypted_name.strip_suffix(".enc")
}

pub fn is_backup_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX)
        && (name.ends_with(ARCHIVE_SUFFIX) || name.ends_with(ENCRYPTED_SUFFIX))
}

pub fn is_encrypted_name(name: &str) -> bool {
    name.ends_with(".enc")
}

/// Reduces untrusted input to its final path component.
///
/// Returns `None` for inputs without one, such as `""`, `".."` or `"/"`.
pub fn base_name(input: &str) -> Option<&str> {
    Path::new(input).file_name().and_then(|name| name.to_str())
}
