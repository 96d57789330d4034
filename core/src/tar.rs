use crate::archive::{ArchiveRequest, Archiver};
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Archives with the system `tar`, gzip-compressed.
#[derive(Debug, Clone)]
pub struct TarArchiver {
    program: PathBuf,
}

impl TarArchiver {
    pub fn new() -> Self {
        Self::with_program("tar")
    }

    pub fn with_program<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for TarArchiver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    async fn archive(&self, request: &ArchiveRequest) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-czf")
            .arg(&request.output)
            .arg("-C")
            .arg(&request.root);

        // An empty source list still yields a valid, empty archive.
        if request.sources.is_empty() {
            warn!(
                "Nothing to archive under {}; writing an empty archive",
                request.root.display()
            );
            cmd.arg("--files-from").arg("/dev/null");
        } else {
            cmd.arg("--").args(&request.sources);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "Running {} for {} sources into {}",
            self.program.display(),
            request.sources.len(),
            request.output.display()
        );

        let child = cmd.spawn().map_err(|e| {
            Error::Archive(format!("Failed to run {}: {}", self.program.display(), e))
        })?;

        let output = tokio::time::timeout(request.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::ArchiveTimeout {
                secs: request.timeout.as_secs(),
            })?
            .map_err(|e| Error::Archive(format!("tar did not complete: {}", e)))?;

        // Partial archives are expected; a failing exit is reported, not raised.
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("tar exited with {}: {}", output.status, stderr.trim());
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "tar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tar_available() -> bool {
        std::process::Command::new("tar")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_tar_archive() {
        if !tar_available() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("state")).unwrap();
        std::fs::write(root.join("state/db.json"), b"{}").unwrap();
        std::fs::write(root.join(".env"), b"A=1\n").unwrap();

        let output = root.join("out.tar.gz");
        let request = ArchiveRequest {
            root: root.to_path_buf(),
            sources: vec![PathBuf::from("state"), PathBuf::from(".env")],
            output: output.clone(),
            timeout: Duration::from_secs(30),
        };

        TarArchiver::new().archive(&request).await.unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let request = ArchiveRequest {
            root: dir.path().to_path_buf(),
            sources: vec![PathBuf::from("state")],
            output: dir.path().join("out.tar.gz"),
            timeout: Duration::from_secs(5),
        };

        let err = TarArchiver::with_program("/nonexistent/tar")
            .archive(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }

    #[tokio::test]
    async fn test_no_sources_writes_empty_archive() {
        if !tar_available() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let request = ArchiveRequest {
            root: dir.path().to_path_buf(),
            sources: Vec::new(),
            output: dir.path().join("out.tar.gz"),
            timeout: Duration::from_secs(30),
        };

        TarArchiver::new().archive(&request).await.unwrap();

        let bytes = std::fs::read(&request.output).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_archiver() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("slow-tar");
        std::fs::write(&program, "#!/bin/sh\nexec sleep 10\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let request = ArchiveRequest {
            root: dir.path().to_path_buf(),
            sources: vec![PathBuf::from("state")],
            output: dir.path().join("out.tar.gz"),
            timeout: Duration::from_millis(100),
        };

        let started = Instant::now();
        let err = TarArchiver::with_program(&program)
            .archive(&request)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ArchiveTimeout { .. }), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
