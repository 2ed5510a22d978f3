//! File-level encryption boundary.
//!
//! The session core only needs "encrypt this file to that recipient" and
//! "decrypt this file with that passphrase". Any backend honoring
//! [`CryptoEngine`] can be plugged in; [`GpgEngine`] drives the `gpg` binary.

pub mod gpg;

pub use gpg::{GpgEngine, SystemGpg};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption key not found for recipient '{0}'")]
    RecipientKeyNotFound(String),
    #[error("input file unreadable: {0}")]
    InputUnreadable(PathBuf),
    #[error("decryption failed: bad passphrase")]
    BadPassphrase,
    #[error("decryption failed: no matching secret key")]
    NoSecretKey,
    #[error("crypto binary '{0}' not found")]
    BinaryMissing(String),
    #[error("crypto engine failure: {0}")]
    Other(String),
}

#[async_trait]
pub trait CryptoEngine: Send + Sync {
    /// Encrypt `input` into `output` for `recipient_key_id`.
    async fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        recipient_key_id: &str,
    ) -> Result<(), CryptoError>;

    /// Decrypt `input` into `output`, unlocking the secret key with `passphrase`.
    async fn decrypt(&self, input: &Path, output: &Path, passphrase: &str)
        -> Result<(), CryptoError>;

    /// Add the keys in `key_file` to the engine's keyring.
    async fn import_key(&self, key_file: &Path) -> Result<(), CryptoError>;
}

/// Fail fast with `InputUnreadable` before handing a path to a backend.
pub(crate) async fn ensure_readable(path: &Path) -> Result<(), CryptoError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(CryptoError::InputUnreadable(path.to_path_buf())),
    }
}
