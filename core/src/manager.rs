use crate::archive::{self, ArchiveRequest, Archiver};
use crate::catalog;
use crate::cleanup::CleanupScheduler;
use crate::config::{BackupConfig, EnvSecretSource, SecretSource};
use crate::crypto;
use crate::naming;
use crate::tar::TarArchiver;
use crate::{BackupEntry, BackupResult, Error, Result};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Creates, lists and decrypts the backups of one MegaStack root.
///
/// Backups live in `<root>/backups`:
///
/// ```text
/// backups/
/// ├── megastack-backup-2024-01-01T00-00-00.tar.gz       # unencrypted
/// └── megastack-backup-2024-01-02T00-00-00.tar.gz.enc   # nonce ‖ tag ‖ ciphertext
/// ```
///
/// # Examples
///
/// ```no_run
/// use megastack_backup_core::{BackupConfig, BackupManager};
///
/// #[tokio::main]
/// async fn main() -> megastack_backup_core::Result<()> {
///     let manager = BackupManager::new(BackupConfig::new("/opt/megastack"))?;
///
///     let backup = manager.create(true).await?;
///     for entry in manager.list().await {
///         println!("{} {}", entry.filename, entry.size);
///     }
///
///     let plaintext = manager.decrypt(&backup.filename).await?;
///     println!("available for 60s at {}", plaintext.display());
///     Ok(())
/// }
/// ```
pub struct BackupManager {
    config: BackupConfig,
    archiver: Arc<dyn Archiver>,
    secrets: Arc<dyn SecretSource>,
    cleanup: CleanupScheduler,
    create_lock: Mutex<()>,
}

impl BackupManager {
    /// Builds a manager using the system `tar` and secrets from the
    /// environment. The root is made absolute.
    pub fn new(mut config: BackupConfig) -> Result<Self> {
        config.root = std::path::absolute(&config.root)?;
        let cleanup = CleanupScheduler::new(config.cleanup_delay());

        Ok(Self {
            config,
            archiver: Arc::new(TarArchiver::new()),
            secrets: Arc::new(EnvSecretSource),
            cleanup,
            create_lock: Mutex::new(()),
        })
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_secret_source(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.config.backups_dir()
    }

    /// Pending deletions of decrypted plaintext files.
    pub fn cleanup(&self) -> &CleanupScheduler {
        &self.cleanup
    }

    /// Archives the root and, when `encrypt` is set and a secret is available,
    /// seals the archive.
    ///
    /// Without a secret the plaintext archive is kept and reported with
    /// `encrypted = false`; that is not an error.
    ///
    /// # Errors
    ///
    /// * `Error::Archive` / `Error::ArchiveTimeout` - the archiver failed to
    ///   run, timed out, or produced nothing
    /// * `Error::Config` - invalid key derivation parameters
    /// * `Error::Io` - filesystem failures
    ///
    /// If encryption fails, the intermediate plaintext archive is removed.
    pub async fn create(&self, encrypt: bool) -> Result<BackupResult> {
        self.create_at(Utc::now(), encrypt).await
    }

    async fn create_at(&self, now: DateTime<Utc>, encrypt: bool) -> Result<BackupResult> {
        let _guard = self.create_lock.lock().await;

        let backups_dir = self.backups_dir();
        fs::create_dir_all(&backups_dir).await?;

        let archive_name = naming::archive_name(now);
        let archive_path = backups_dir.join(&archive_name);

        let sources = archive::collect_sources(self.root()).await;
        info!(
            "Archiving {} sources from {} with {}",
            sources.len(),
            self.root().display(),
            self.archiver.name()
        );

        let request = ArchiveRequest {
            root: self.root().to_path_buf(),
            sources,
            output: archive_path.clone(),
            timeout: self.config.archive_timeout(),
        };
        self.archiver.archive(&request).await?;

        if !fs::try_exists(&archive_path).await.unwrap_or(false) {
            return Err(Error::Archive(format!(
                "archiver produced no output at {}",
                archive_path.display()
            )));
        }

        if encrypt {
            match self.secrets.resolve() {
                Some(secret) => {
                    let encrypted_name = naming::encrypted_name(&archive_name);
                    let encrypted_path = backups_dir.join(&encrypted_name);

                    // A failed seal must not leave the plaintext listed as a backup.
                    if let Err(e) = self.seal(secret, &archive_path, &encrypted_path).await {
                        warn!("Encrypting {} failed; removing plaintext", archive_name);
                        let _ = fs::remove_file(&archive_path).await;
                        return Err(e);
                    }
                    fs::remove_file(&archive_path).await?;

                    let result = describe(encrypted_name, encrypted_path, now, true).await?;
                    info!("Created encrypted backup {} ({} bytes)", result.filename, result.size);
                    return Ok(result);
                }
                None => {
                    warn!("No backup secret configured; keeping {} unencrypted", archive_name);
                }
            }
        }

        let result = describe(archive_name, archive_path, now, false).await?;
        info!("Created backup {} ({} bytes)", result.filename, result.size);
        Ok(result)
    }

    async fn seal(&self, secret: SecretString, source: &Path, dest: &Path) -> Result<u64> {
        let key = crypto::derive_key_blocking(secret, self.config.kdf.clone()).await?;
        crypto::seal_file(&key, source, dest).await
    }

    /// Backups on disk, newest first. Never fails; an unreadable directory
    /// lists as empty.
    pub async fn list(&self) -> Vec<BackupEntry> {
        catalog::list_backups(&self.backups_dir()).await
    }

    /// Validates an untrusted filename and returns the path of that backup.
    ///
    /// # Errors
    ///
    /// * `Error::InvalidFilename` - the name does not follow the backup
    ///   naming convention
    /// * `Error::NotFound` - no such backup
    pub async fn resolve_path(&self, filename: &str) -> Result<PathBuf> {
        catalog::resolve_backup_path(&self.backups_dir(), filename).await
    }

    /// Decrypts an encrypted backup next to itself and returns the plaintext
    /// path. The plaintext is deleted after the configured cleanup delay.
    ///
    /// Nothing is written unless the envelope authenticates.
    ///
    /// # Errors
    ///
    /// * `Error::InvalidFilename` - the name does not follow the backup
    ///   naming convention
    /// * `Error::NotEncrypted` - the backup is a plain `.tar.gz`
    /// * `Error::NoSecret` - no secret configured
    /// * `Error::NotFound` - no such backup
    /// * `Error::Integrity` - wrong key, tampering or corruption
    /// * `Error::AlreadyExists` - a file with the plaintext name exists and
    ///   is not an earlier decryption awaiting cleanup
    pub async fn decrypt(&self, filename: &str) -> Result<PathBuf> {
        let name = catalog::validated_name(filename)?;
        let plaintext_name = naming::plaintext_name(name).ok_or_else(|| Error::NotEncrypted {
            filename: name.to_string(),
        })?;

        let secret = self.secrets.resolve().ok_or(Error::NoSecret)?;

        let encrypted_path = catalog::resolve_backup_path(&self.backups_dir(), name).await?;
        let envelope = fs::read(&encrypted_path).await?;

        let key = crypto::derive_key_blocking(secret, self.config.kdf.clone()).await?;
        let plaintext = crypto::open(&key, &envelope)?;

        let plaintext_path = self.backups_dir().join(plaintext_name);
        if !self.cleanup.is_pending(&plaintext_path)
            && fs::try_exists(&plaintext_path).await.unwrap_or(true)
        {
            return Err(Error::AlreadyExists {
                filename: plaintext_name.to_string(),
            });
        }
        fs::write(&plaintext_path, &plaintext).await?;
        self.cleanup.schedule(plaintext_path.clone());

        debug!(
            "Decrypted {} to {}; removing in {}s",
            name,
            plaintext_path.display(),
            self.cleanup.delay().as_secs()
        );
        Ok(plaintext_path)
    }
}

async fn describe(
    filename: String,
    path: PathBuf,
    now: DateTime<Utc>,
    encrypted: bool,
) -> Result<BackupResult> {
    let metadata = fs::metadata(&path).await?;
    let created = metadata
        .created()
        .map(DateTime::<Utc>::from)
        .unwrap_or(now);

    Ok(BackupResult {
        filename,
        path,
        size: metadata.len(),
        created,
        encrypted,
    })
}
