//! Secure handoff of a finalized session document to the processor and
//! collection of its response.
//!
//! A transfer walks `Built -> Published -> AwaitingResult -> Retrieved ->
//! Decoded`. Each store step opens its own connection and releases it before
//! returning.

pub mod poll;
pub mod response;

pub use poll::{poll_for_file, PollOutcome, PollPolicy};
pub use response::{DocumentParser, EnvelopeParser, ResponseDocument};

use crate::common::AppConfig;
use crate::crypto::{CryptoEngine, CryptoError};
use crate::store::{paths, release, RemoteConnection, RemoteFileStore, StoreError};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// Subdirectory holding ciphertext next to the plaintext it belongs to.
pub const ENCRYPTED_DIR: &str = "encrypted";
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

const HASH_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("transfer file error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot {operation} while transfer is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: TransferState,
    },
    #[error("failed to decode response {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
}

impl TransferError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Built,
    Published,
    AwaitingResult,
    Retrieved,
    Decoded,
}

/// What was handed to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHandle {
    /// File name of the plaintext document; the same whether or not the
    /// uploaded bytes were encrypted.
    pub remote_name: String,
    pub uploaded_path: PathBuf,
    pub sha256: String,
}

/// Settings fixed for the lifetime of one orchestrator.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub encrypt: bool,
    pub recipient_key_id: String,
    pub passphrase: String,
    pub response_dir: PathBuf,
    pub delete_after_retrieve: bool,
    pub poll: PollPolicy,
}

impl From<&AppConfig> for TransferSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            encrypt: config.encryption.enabled,
            recipient_key_id: config.encryption.recipient_key_id.clone(),
            passphrase: config.encryption.passphrase.clone(),
            response_dir: config.session.response_dir.clone(),
            delete_after_retrieve: config.store.delete_after_retrieve,
            poll: PollPolicy {
                timeout: config.poll.timeout(),
                interval: config.poll.interval(),
            },
        }
    }
}

pub struct TransferOrchestrator {
    settings: TransferSettings,
    store: Arc<dyn RemoteFileStore>,
    crypto: Arc<dyn CryptoEngine>,
    parser: Arc<dyn DocumentParser>,
    state: TransferState,
    remote_name: Option<String>,
    retrieved: Option<PathBuf>,
    result_removed: bool,
}

impl TransferOrchestrator {
    pub fn new(
        settings: TransferSettings,
        store: Arc<dyn RemoteFileStore>,
        crypto: Arc<dyn CryptoEngine>,
    ) -> Self {
        Self {
            settings,
            store,
            crypto,
            parser: Arc::new(EnvelopeParser),
            state: TransferState::Built,
            remote_name: None,
            retrieved: None,
            result_removed: false,
        }
    }

    /// Pick up a transfer published earlier, e.g. by another process.
    pub fn resume(
        settings: TransferSettings,
        store: Arc<dyn RemoteFileStore>,
        crypto: Arc<dyn CryptoEngine>,
        remote_name: impl Into<String>,
    ) -> Self {
        let mut orchestrator = Self::new(settings, store, crypto);
        orchestrator.state = TransferState::Published;
        orchestrator.remote_name = Some(remote_name.into());
        orchestrator
    }

    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn remote_name(&self) -> Option<&str> {
        self.remote_name.as_deref()
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Whether the last retrieve removed the result from the store. False when
    /// removal is disabled or failed.
    pub fn remote_result_removed(&self) -> bool {
        self.result_removed
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[TransferState],
    ) -> Result<(), TransferError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TransferError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn current_remote_name(&self, operation: &'static str) -> Result<String, TransferError> {
        self.remote_name
            .clone()
            .ok_or(TransferError::InvalidState {
                operation,
                state: self.state,
            })
    }

    /// Encrypt (when enabled) and upload `document`, making it visible to the
    /// processor only once the upload has completed.
    #[tracing::instrument(skip(self, document), fields(document = %document.display()))]
    pub async fn publish(&mut self, document: &Path) -> Result<TransferHandle, TransferError> {
        self.expect_state("publish", &[TransferState::Built])?;

        let remote_name = document
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                TransferError::io(
                    format!("publish {}", document.display()),
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file name"),
                )
            })?;

        let uploaded_path = if self.settings.encrypt {
            let dir = document
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(ENCRYPTED_DIR);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| TransferError::io(format!("create {}", dir.display()), e))?;
            let target = dir.join(format!("{remote_name}{ENCRYPTED_SUFFIX}"));
            self.crypto
                .encrypt(document, &target, &self.settings.recipient_key_id)
                .await?;
            target
        } else {
            document.to_path_buf()
        };

        let sha256 = sha256_file(&uploaded_path).await?;

        let mut conn = self.store.connect().await?;
        let result = upload_then_rename(conn.as_mut(), &uploaded_path, &remote_name).await;
        release(conn, result).await?;

        tracing::info!(
            remote_name = %remote_name,
            sha256 = %sha256,
            encrypted = self.settings.encrypt,
            "Published request document"
        );

        self.state = TransferState::Published;
        self.remote_name = Some(remote_name.clone());
        Ok(TransferHandle {
            remote_name,
            uploaded_path,
            sha256,
        })
    }

    /// Wait for the processor's result using the configured policy.
    pub async fn await_result(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, TransferError> {
        let timeout = self.settings.poll.timeout;
        self.await_result_within(timeout, cancel).await
    }

    /// Wait up to `timeout` for the result. Timing out or being cancelled
    /// leaves the transfer `Published` so the wait can be repeated.
    pub async fn await_result_within(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, TransferError> {
        self.expect_state("await result", &[TransferState::Published])?;
        let remote_name = self.current_remote_name("await result")?;
        let policy = PollPolicy {
            timeout,
            interval: self.settings.poll.interval,
        };

        self.state = TransferState::AwaitingResult;
        let outcome = poll_for_file(
            self.store.as_ref(),
            &paths::outbound_result(&remote_name),
            policy,
            cancel,
        )
        .await;

        match outcome {
            Ok(PollOutcome::Ready) => Ok(PollOutcome::Ready),
            Ok(other) => {
                self.state = TransferState::Published;
                Ok(other)
            }
            Err(e) => {
                self.state = TransferState::Published;
                Err(e.into())
            }
        }
    }

    /// Download the result and, when encryption is enabled, decrypt it.
    ///
    /// Retrieving straight from `Published` is allowed; a result that is not
    /// there yet surfaces as a not-found store error.
    #[tracing::instrument(skip(self))]
    pub async fn retrieve(&mut self) -> Result<PathBuf, TransferError> {
        self.expect_state(
            "retrieve",
            &[TransferState::Published, TransferState::AwaitingResult],
        )?;
        let remote_name = self.current_remote_name("retrieve")?;
        let response_dir = self.settings.response_dir.clone();
        tokio::fs::create_dir_all(&response_dir)
            .await
            .map_err(|e| TransferError::io(format!("create {}", response_dir.display()), e))?;

        let plaintext = response_dir.join(plaintext_name(&remote_name));
        let download_to = if self.settings.encrypt {
            let dir = response_dir.join(ENCRYPTED_DIR);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| TransferError::io(format!("create {}", dir.display()), e))?;
            dir.join(&remote_name)
        } else {
            plaintext.clone()
        };

        let remote = paths::outbound_result(&remote_name);
        let mut conn = self.store.connect().await?;
        let result = conn.download(&remote, &download_to).await;
        release(conn, result).await?;

        if self.settings.encrypt {
            self.crypto
                .decrypt(&download_to, &plaintext, &self.settings.passphrase)
                .await?;
        }

        // The remote copy goes only once a readable plaintext exists locally.
        self.result_removed =
            self.settings.delete_after_retrieve && self.remove_result(&remote).await;

        tracing::info!(
            path = %plaintext.display(),
            remote_removed = self.result_removed,
            "Retrieved response document"
        );
        self.state = TransferState::Retrieved;
        self.retrieved = Some(plaintext.clone());
        Ok(plaintext)
    }

    /// Delete a retrieved result from the store. Failure is logged, not
    /// returned, since the result is already local.
    async fn remove_result(&self, remote: &str) -> bool {
        let removed = match self.store.connect().await {
            Ok(mut conn) => {
                let result = conn.delete(remote).await;
                release(conn, result).await
            }
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(remote, error = %e, "Failed to remove retrieved result from store");
                false
            }
        }
    }

    /// Parse the retrieved response.
    pub async fn decode(&mut self) -> Result<ResponseDocument, TransferError> {
        self.expect_state("decode", &[TransferState::Retrieved])?;
        let path = self.retrieved.clone().ok_or(TransferError::InvalidState {
            operation: "decode",
            state: self.state,
        })?;
        let document = self.parser.parse(&path).await?;
        self.state = TransferState::Decoded;
        Ok(document)
    }
}

async fn upload_then_rename(
    conn: &mut dyn RemoteConnection,
    local: &Path,
    remote_name: &str,
) -> Result<(), StoreError> {
    let in_flight = paths::inbound_in_flight(remote_name);
    conn.upload(local, &in_flight).await?;
    conn.rename(&in_flight, &paths::inbound_ready(remote_name))
        .await
}

/// Name of the plaintext result for a remote name, without any encrypted
/// suffix.
pub fn plaintext_name(name: &str) -> &str {
    name.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(name)
}

/// Hex SHA-256 of a file, read in bounded chunks.
pub async fn sha256_file(path: &Path) -> Result<String, TransferError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| TransferError::io(format!("open {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buffer)
            .await
            .map_err(|e| TransferError::io(format!("read {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
