use async_trait::async_trait;
use batchdrop::crypto::{CryptoEngine, CryptoError};
use batchdrop::store::{
    paths, LocalStore, RemoteConnection, RemoteFileStore, RemoteMetadata, StoreError,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const CIPHER_PREFIX: &[u8] = b"FAKE-PGP:";

/// Reversible stand-in for gpg: prefixes the plaintext with a marker and the
/// recipient.
#[derive(Default)]
pub struct FakeCrypto {
    pub calls: Mutex<Vec<String>>,
    pub passphrase: String,
}

impl FakeCrypto {
    pub fn new(passphrase: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            passphrase: passphrase.to_string(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn seal(recipient: &str, plaintext: &[u8]) -> Vec<u8> {
        let mut out = CIPHER_PREFIX.to_vec();
        out.extend_from_slice(recipient.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(plaintext);
        out
    }
}

#[async_trait]
impl CryptoEngine for FakeCrypto {
    async fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        recipient_key_id: &str,
    ) -> Result<(), CryptoError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("encrypt {}", input.display()));
        let plaintext = tokio::fs::read(input)
            .await
            .map_err(|_| CryptoError::InputUnreadable(input.to_path_buf()))?;
        tokio::fs::write(output, Self::seal(recipient_key_id, &plaintext))
            .await
            .map_err(|e| CryptoError::Other(e.to_string()))
    }

    async fn decrypt(
        &self,
        input: &Path,
        output: &Path,
        passphrase: &str,
    ) -> Result<(), CryptoError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("decrypt {}", input.display()));
        if passphrase != self.passphrase {
            return Err(CryptoError::BadPassphrase);
        }
        let sealed = tokio::fs::read(input)
            .await
            .map_err(|_| CryptoError::InputUnreadable(input.to_path_buf()))?;
        let rest = sealed
            .strip_prefix(CIPHER_PREFIX)
            .ok_or_else(|| CryptoError::Other("not encrypted".to_string()))?;
        let newline = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| CryptoError::Other("missing recipient".to_string()))?;
        tokio::fs::write(output, &rest[newline + 1..])
            .await
            .map_err(|e| CryptoError::Other(e.to_string()))
    }

    async fn import_key(&self, key_file: &Path) -> Result<(), CryptoError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("import {}", key_file.display()));
        Ok(())
    }
}

/// One observed store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Connect,
    Upload(String),
    Rename(String, String),
    Stat(String),
    Download(String),
    Delete(String),
    Disconnect,
    /// Whether the ready name was visible right before the rename.
    ReadyVisibleBeforeRename(bool),
}

/// Local store that records every operation it sees.
#[derive(Clone)]
pub struct RecordingStore {
    pub inner: LocalStore,
    pub ops: Arc<Mutex<Vec<Op>>>,
}

impl RecordingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: LocalStore::new(root),
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: Op) {
        self.ops.lock().unwrap().push(op);
    }
}

struct RecordingConnection {
    inner: Box<dyn RemoteConnection>,
    store: RecordingStore,
}

#[async_trait]
impl RemoteFileStore for RecordingStore {
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>, StoreError> {
        self.record(Op::Connect);
        let inner = self.inner.connect().await?;
        Ok(Box::new(RecordingConnection {
            inner,
            store: self.clone(),
        }))
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[async_trait]
impl RemoteConnection for RecordingConnection {
    async fn upload(&mut self, local: &Path, remote: &str) -> Result<(), StoreError> {
        self.store.record(Op::Upload(remote.to_string()));
        self.inner.upload(local, remote).await
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<(), StoreError> {
        if let Some(name) = from
            .strip_prefix("inbound/")
            .and_then(|n| n.strip_suffix(paths::IN_FLIGHT_SUFFIX))
        {
            let visible = self.inner.stat(&paths::inbound_ready(name)).await.is_ok();
            self.store.record(Op::ReadyVisibleBeforeRename(visible));
        }
        self.store
            .record(Op::Rename(from.to_string(), to.to_string()));
        self.inner.rename(from, to).await
    }

    async fn stat(&mut self, remote: &str) -> Result<RemoteMetadata, StoreError> {
        self.store.record(Op::Stat(remote.to_string()));
        self.inner.stat(remote).await
    }

    async fn download(&mut self, remote: &str, local: &Path) -> Result<(), StoreError> {
        self.store.record(Op::Download(remote.to_string()));
        self.inner.download(remote, local).await
    }

    async fn delete(&mut self, remote: &str) -> Result<(), StoreError> {
        self.store.record(Op::Delete(remote.to_string()));
        self.inner.delete(remote).await
    }

    async fn disconnect(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.store.record(Op::Disconnect);
        this.inner.disconnect().await
    }
}
