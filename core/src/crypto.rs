//! Key derivation and the on-disk encryption envelope.
//!
//! Envelope layout:
//!
//! ```text
//! [0:16)   nonce
//! [16:32)  authentication tag
//! [32:end] ciphertext (same length as the plaintext)
//! ```

use crate::config::KdfParams;
use crate::{Error, Result};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use zeroize::Zeroize;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = NONCE_LEN + TAG_LEN;

/// Fixed application salt. Every backup shares it, so the same secret always
/// yields the same key.
pub const KEY_SALT: &[u8] = b"megastack-backup-salt";

/// AES-256-GCM with a 16-byte nonce.
type BackupCipher = AesGcm<Aes256, U16>;

pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    fn cipher(&self) -> BackupCipher {
        BackupCipher::new(GenericArray::from_slice(&self.bytes))
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derives the backup key from `secret` using the fixed salt.
///
/// This is deliberately slow; async callers should go through
/// [`derive_key_blocking`].
pub fn derive_key(secret: &SecretString, params: &KdfParams) -> Result<DerivedKey> {
    let password = secret.expose_secret().as_bytes();
    if password.is_empty() {
        return Err(Error::NoSecret);
    }

    let mut bytes = [0u8; KEY_LEN];
    match *params {
        KdfParams::Scrypt { log_n, r, p } => {
            let params = scrypt::Params::new(log_n, r, p, KEY_LEN)
                .map_err(|e| Error::Config(format!("invalid scrypt params: {}", e)))?;
            scrypt::scrypt(password, KEY_SALT, &params, &mut bytes)
                .map_err(|e| Error::Encryption(e.to_string()))?;
        }
        KdfParams::Argon2id {
            memory_kib,
            iterations,
            parallelism,
        } => {
            let params = Params::new(memory_kib, iterations, parallelism, Some(KEY_LEN))
                .map_err(|e| Error::Config(format!("invalid argon2id params: {}", e)))?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password_into(password, KEY_SALT, &mut bytes)
                .map_err(|e| Error::Encryption(e.to_string()))?;
        }
    }

    Ok(DerivedKey::from_bytes(bytes))
}

/// Runs [`derive_key`] on the blocking pool.
pub async fn derive_key_blocking(secret: SecretString, params: KdfParams) -> Result<DerivedKey> {
    tokio::task::spawn_blocking(move || derive_key(&secret, &params))
        .await
        .map_err(|e| Error::Other(format!("key derivation task failed: {}", e)))?
}

/// Encrypts `plaintext` into a complete envelope with a fresh random nonce.
pub fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut envelope = Vec::with_capacity(HEADER_LEN + plaintext.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&[0u8; TAG_LEN]);
    envelope.extend_from_slice(plaintext);

    let tag = key
        .cipher()
        .encrypt_in_place_detached(
            GenericArray::from_slice(&nonce),
            b"",
            &mut envelope[HEADER_LEN..],
        )
        .map_err(|e| Error::Encryption(e.to_string()))?;
    envelope[NONCE_LEN..HEADER_LEN].copy_from_slice(&tag);

    Ok(envelope)
}

/// Verifies and decrypts an envelope.
///
/// Anything that fails authentication, including a truncated header, is an
/// [`Error::Integrity`].
pub fn open(key: &DerivedKey, envelope: &[u8]) -> Result<Vec<u8>> {
    if envelope.len() < HEADER_LEN {
        return Err(Error::Integrity);
    }

    let (nonce, rest) = envelope.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let mut plaintext = ciphertext.to_vec();
    key.cipher()
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            &mut plaintext,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| Error::Integrity)?;

    Ok(plaintext)
}

/// Seals the file at `source` into `dest`.
///
/// The envelope is written to a `.part` sibling, synced and renamed into
/// place, so `dest` only ever appears complete. `source` is left alone.
pub async fn seal_file(key: &DerivedKey, source: &Path, dest: &Path) -> Result<u64> {
    let plaintext = fs::read(source).await?;
    let envelope = seal(key, &plaintext)?;

    let mut part_name = dest.as_os_str().to_os_string();
    part_name.push(".part");
    let part = Path::new(&part_name);

    let written = match write_synced(part, &envelope).await {
        Ok(()) => fs::rename(part, dest).await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        let _ = fs::remove_file(part).await;
        return Err(e.into());
    }

    debug!(
        "Sealed {} ({} bytes) into {}",
        source.display(),
        plaintext.len(),
        dest.display()
    );
    Ok(envelope.len() as u64)
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}
