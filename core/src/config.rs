use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Dedicated backup key, checked first.
pub const BACKUP_KEY_ENV: &str = "MS_BACKUP_KEY";
/// General session secret, used when no dedicated key is set.
pub const SESSION_SECRET_ENV: &str = "MS_SESSION_SECRET";

pub const DEFAULT_ARCHIVE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CLEANUP_DELAY_SECS: u64 = 60;

/// Settings for a [`BackupManager`](crate::BackupManager).
///
/// Usually loaded from a TOML file:
///
/// ```toml
/// root = "/opt/megastack"
/// archive_timeout_secs = 300
/// cleanup_delay_secs = 60
///
/// [kdf]
/// algorithm = "scrypt"
/// log_n = 14
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub root: PathBuf,
    pub archive_timeout_secs: u64,
    pub cleanup_delay_secs: u64,
    pub kdf: KdfParams,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            archive_timeout_secs: DEFAULT_ARCHIVE_TIMEOUT_SECS,
            cleanup_delay_secs: DEFAULT_CLEANUP_DELAY_SECS,
            kdf: KdfParams::default(),
        }
    }
}

impl BackupConfig {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn archive_timeout(&self) -> Duration {
        Duration::from_secs(self.archive_timeout_secs)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }
}

/// Key derivation settings.
///
/// Scrypt with N=2^14, r=8, p=1 is the default because backups written by the
/// dashboard were sealed with exactly those parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum KdfParams {
    Scrypt {
        #[serde(default = "default_log_n")]
        log_n: u8,
        #[serde(default = "default_r")]
        r: u32,
        #[serde(default = "default_p")]
        p: u32,
    },
    Argon2id {
        #[serde(default = "default_memory_kib")]
        memory_kib: u32,
        #[serde(default = "default_iterations")]
        iterations: u32,
        #[serde(default = "default_parallelism")]
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::Scrypt {
            log_n: default_log_n(),
            r: default_r(),
            p: default_p(),
        }
    }
}

fn default_log_n() -> u8 {
    14
}

fn default_r() -> u32 {
    8
}

fn default_p() -> u32 {
    1
}

fn default_memory_kib() -> u32 {
    65536
}

fn default_iterations() -> u32 {
    3
}

fn default_parallelism() -> u32 {
    4
}

/// Where the backup secret comes from.
///
/// Resolved once per operation; the result is handed to key derivation
/// explicitly.
pub trait SecretSource: Send + Sync {
    fn resolve(&self) -> Option<SecretString>;
}

/// Reads [`BACKUP_KEY_ENV`], falling back to [`SESSION_SECRET_ENV`].
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretSource;

impl EnvSecretSource {
    /// Empty values count as unset.
    pub fn resolve_with<F>(lookup: F) -> Option<SecretString>
    where
        F: Fn(&str) -> Option<String>,
    {
        [BACKUP_KEY_ENV, SESSION_SECRET_ENV]
            .into_iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.is_empty())
            .map(SecretString::from)
    }
}

impl SecretSource for EnvSecretSource {
    fn resolve(&self) -> Option<SecretString> {
        Self::resolve_with(|name| std::env::var(name).ok())
    }
}

/// A fixed secret, or none at all.
pub struct StaticSecret(Option<SecretString>);

impl StaticSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Some(SecretString::from(secret.into())))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl SecretSource for StaticSecret {
    fn resolve(&self) -> Option<SecretString> {
        self.0
            .as_ref()
            .map(|s| SecretString::from(s.expose_secret().to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_dedicated_key_preferred() {
        let secret = EnvSecretSource::resolve_with(lookup(&[
            (BACKUP_KEY_ENV, "backup"),
            (SESSION_SECRET_ENV, "session"),
        ]))
        .unwrap();
        assert_eq!(secret.expose_secret(), "backup");
    }

    #[test]
    fn test_session_secret_fallback() {
        let secret =
            EnvSecretSource::resolve_with(lookup(&[(SESSION_SECRET_ENV, "session")])).unwrap();
        assert_eq!(secret.expose_secret(), "session");

        let secret = EnvSecretSource::resolve_with(lookup(&[
            (BACKUP_KEY_ENV, ""),
            (SESSION_SECRET_ENV, "session"),
        ]))
        .unwrap();
        assert_eq!(secret.expose_secret(), "session");
    }

    #[test]
    fn test_no_secret() {
        assert!(EnvSecretSource::resolve_with(lookup(&[])).is_none());
        assert!(EnvSecretSource::resolve_with(lookup(&[(SESSION_SECRET_ENV, "")])).is_none());
        assert!(StaticSecret::none().resolve().is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let config = BackupConfig::from_toml_str(
            r#"
            root = "/opt/megastack"
            cleanup_delay_secs = 5

            [kdf]
            algorithm = "argon2id"
            memory_kib = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/opt/megastack"));
        assert_eq!(config.backups_dir(), PathBuf::from("/opt/megastack/backups"));
        assert_eq!(config.cleanup_delay(), Duration::from_secs(5));
        assert_eq!(config.archive_timeout_secs, DEFAULT_ARCHIVE_TIMEOUT_SECS);
        assert_eq!(
            config.kdf,
            KdfParams::Argon2id {
                memory_kib: 1024,
                iterations: 3,
                parallelism: 4,
            }
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = BackupConfig::from_toml_str("").unwrap();
        assert_eq!(config.archive_timeout(), Duration::from_secs(300));
        assert_eq!(config.cleanup_delay(), Duration::from_secs(60));
        assert_eq!(config.kdf, KdfParams::Scrypt { log_n: 14, r: 8, p: 1 });
    }

    #[test]
    fn test_config_rejects_unknown_algorithm() {
        let err = BackupConfig::from_toml_str("[kdf]\nalgorithm = \"md5\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
