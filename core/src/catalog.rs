use crate::naming;
use crate::{BackupEntry, Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Lists the backups in `backups_dir`, newest first.
///
/// Only regular files following the naming convention are reported. A missing
/// or unreadable directory yields an empty list.
pub async fn list_backups(backups_dir: &Path) -> Vec<BackupEntry> {
    let mut entries = match fs::read_dir(backups_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No backups listed from {}: {}", backups_dir.display(), e);
            return Vec::new();
        }
    };

    let mut backups = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading {}: {}", backups_dir.display(), e);
                break;
            }
        };

        let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !naming::is_backup_name(&filename) {
            continue;
        }

        let metadata = match fs::metadata(entry.path()).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                debug!("Skipping {}: {}", filename, e);
                continue;
            }
        };
        let modified: DateTime<Utc> = match metadata.modified() {
            Ok(modified) => modified.into(),
            Err(e) => {
                debug!("Skipping {}: {}", filename, e);
                continue;
            }
        };

        backups.push(BackupEntry {
            encrypted: naming::is_encrypted_name(&filename),
            filename,
            size: metadata.len(),
            modified,
        });
    }

    backups.sort_by(|a, b| b.modified.cmp(&a.modified));
    backups
}

/// Turns an untrusted filename into the path of an existing backup.
///
/// Any directory component is discarded before validation. Every naming
/// failure produces the same [`Error::InvalidFilename`].
pub async fn resolve_backup_path(backups_dir: &Path, filename: &str) -> Result<PathBuf> {
    let name = validated_name(filename)?;
    let path = backups_dir.join(name);

    if !fs::try_exists(&path).await.unwrap_or(false) {
        return Err(Error::NotFound {
            filename: name.to_string(),
        });
    }

    Ok(path)
}

/// Base name of `filename`, if it follows the backup naming convention.
pub(crate) fn validated_name(filename: &str) -> Result<&str> {
    naming::base_name(filename)
        .filter(|name| naming::is_backup_name(name))
        .ok_or(Error::InvalidFilename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    fn touch(dir: &Path, name: &str, content: &[u8], age_secs: u64) {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let backups = dir.path();
        touch(backups, "megastack-backup-2024-01-01T00-00-00.tar.gz", b"one", 300);
        touch(backups, "megastack-backup-2024-01-02T00-00-00.tar.gz.enc", b"twotwo", 200);
        touch(backups, "megastack-backup-2024-01-03T00-00-00.tar.gz", b"3", 100);
        touch(backups, "megastack-backup-2024-01-04T00-00-00.tar.gz.enc.part", b"", 0);
        touch(backups, "notes.txt", b"", 0);
        touch(backups, "other-backup.tar.gz", b"", 0);
        std::fs::create_dir(backups.join("megastack-backup-dir.tar.gz")).unwrap();

        let listed = list_backups(backups).await;
        let names: Vec<&str> = listed.iter().map(|b| b.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "megastack-backup-2024-01-03T00-00-00.tar.gz",
                "megastack-backup-2024-01-02T00-00-00.tar.gz.enc",
                "megastack-backup-2024-01-01T00-00-00.tar.gz",
            ]
        );
        assert_eq!(listed[1].size, 6);
        assert!(listed[1].encrypted);
        assert!(!listed[0].encrypted);
        assert!(listed[0].modified > listed[1].modified);
    }

    #[tokio::test]
    async fn test_list_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_backups(&dir.path().join("backups")).await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_rejects_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "../../etc/passwd",
            "megastack-backup-x.exe",
            "not-a-backup.tar.gz",
            "",
            "..",
            "/etc/megastack-backup-x.tar.gz/..",
        ] {
            let err = resolve_backup_path(dir.path(), name).await.unwrap_err();
            assert!(matches!(err, Error::InvalidFilename), "{:?} accepted", name);
            assert_eq!(err.to_string(), "Invalid backup filename");
        }
    }

    #[tokio::test]
    async fn test_resolve_requires_existence() {
        let dir = tempfile::tempdir().unwrap();
        let name = "megastack-backup-2024-01-01T00-00-00.tar.gz";

        let err = resolve_backup_path(dir.path(), name).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        std::fs::write(dir.path().join(name), b"archive").unwrap();
        let path = resolve_backup_path(dir.path(), name).await.unwrap();
        assert_eq!(path, dir.path().join(name));
    }

    #[tokio::test]
    async fn test_resolve_strips_injected_directories() {
        let dir = tempfile::tempdir().unwrap();
        let name = "megastack-backup-2024-01-01T00-00-00.tar.gz.enc";
        std::fs::write(dir.path().join(name), b"envelope").unwrap();

        let path = resolve_backup_path(dir.path(), &format!("../../{}", name))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join(name));
    }
}
