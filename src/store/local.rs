//! Directory-backed store for mounted drop boxes and tests.

use super::{checked, RemoteConnection, RemoteFileStore, RemoteMetadata, StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Treats a local directory as the remote root.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    open: Arc<AtomicUsize>,
    opened_total: Arc<AtomicUsize>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: Arc::new(AtomicUsize::new(0)),
            opened_total: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Connections opened over the store's lifetime.
    pub fn connections_opened(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteFileStore for LocalStore {
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>, StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::Connection {
                host: self.describe(),
                reason: e.to_string(),
            })?;
        self.open.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LocalConnection {
            root: self.root.clone(),
            open: self.open.clone(),
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}

struct LocalConnection {
    root: PathBuf,
    open: Arc<AtomicUsize>,
    closed: bool,
}

impl LocalConnection {
    fn resolve(&self, remote: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(checked(remote)?))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

async fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(format!("create {}", parent.display()), e))?;
    }
    Ok(())
}

fn map_remote_err(operation: &'static str, remote: &str, e: std::io::Error) -> StoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(remote.to_string())
    } else {
        StoreError::Operation {
            operation,
            path: remote.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl RemoteConnection for LocalConnection {
    async fn upload(&mut self, local: &Path, remote: &str) -> Result<(), StoreError> {
        let target = self.resolve(remote)?;
        ensure_parent(&target).await?;
        tokio::fs::copy(local, &target)
            .await
            .map_err(|e| StoreError::io(format!("upload {}", local.display()), e))?;
        Ok(())
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<(), StoreError> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        ensure_parent(&target).await?;
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| map_remote_err("rename", from, e))
    }

    async fn stat(&mut self, remote: &str) -> Result<RemoteMetadata, StoreError> {
        let path = self.resolve(remote)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_remote_err("stat", remote, e))?;
        Ok(RemoteMetadata {
            path: remote.to_string(),
            size: Some(meta.len()),
        })
    }

    async fn download(&mut self, remote: &str, local: &Path) -> Result<(), StoreError> {
        let source = self.resolve(remote)?;
        ensure_parent(local).await?;
        tokio::fs::copy(&source, local)
            .await
            .map_err(|e| map_remote_err("download", remote, e))?;
        Ok(())
    }

    async fn delete(&mut self, remote: &str) -> Result<(), StoreError> {
        let path = self.resolve(remote)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| map_remote_err("delete", remote, e))
    }

    async fn disconnect(mut self: Box<Self>) -> Result<(), StoreError> {
        self.close();
        Ok(())
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!("Local store connection dropped without disconnect");
            self.close();
        }
    }
}
