//! Remote file store contract.
//!
//! Every transfer step opens its own connection and releases it on every exit
//! path via [`release`]. Connections are never pooled.

pub mod local;
pub mod paths;
pub mod sftp;

pub use local::LocalStore;
pub use sftp::{SftpStore, SystemSftp};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SFTP connection failed to {host}: {reason}")]
    Connection { host: String, reason: String },
    #[error("SFTP authentication failed to {host}: {reason}")]
    Authentication { host: String, reason: String },
    #[error("remote file not found: {0}")]
    NotFound(String),
    #[error("invalid remote path '{path}': {reason}")]
    InvalidPath {
        path: String,
        reason: paths::PathValidationError,
    },
    #[error("remote {operation} failed for '{path}': {reason}")]
    Operation {
        operation: &'static str,
        path: String,
        reason: String,
    },
    #[error("local file error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Failures a poller may wait out.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection { .. } | StoreError::NotFound(_))
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub(crate) fn checked(path: &str) -> Result<&str, StoreError> {
    paths::validate_remote_path(path).map_err(|reason| StoreError::InvalidPath {
        path: path.to_string(),
        reason,
    })?;
    Ok(path)
}

/// Metadata for a remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub path: String,
    pub size: Option<u64>,
}

#[async_trait]
pub trait RemoteFileStore: Send + Sync {
    /// Open an authenticated connection.
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>, StoreError>;

    /// Host label for logs and errors.
    fn describe(&self) -> String;
}

/// One open connection. Paths are relative to the store root.
#[async_trait]
pub trait RemoteConnection: Send {
    async fn upload(&mut self, local: &Path, remote: &str) -> Result<(), StoreError>;
    async fn rename(&mut self, from: &str, to: &str) -> Result<(), StoreError>;
    async fn stat(&mut self, remote: &str) -> Result<RemoteMetadata, StoreError>;
    async fn download(&mut self, remote: &str, local: &Path) -> Result<(), StoreError>;
    async fn delete(&mut self, remote: &str) -> Result<(), StoreError>;
    async fn disconnect(self: Box<Self>) -> Result<(), StoreError>;
}

/// Disconnect `conn` and hand back `result`.
///
/// A body error wins over a disconnect error; a disconnect failure after a
/// successful body is logged, not raised.
pub async fn release<T, E>(conn: Box<dyn RemoteConnection>, result: Result<T, E>) -> Result<T, E> {
    if let Err(e) = conn.disconnect().await {
        tracing::warn!(error = %e, "Failed to disconnect from remote store");
    }
    result
}
