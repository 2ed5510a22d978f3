//! SFTP store driven by the OpenSSH `sftp` client in batch mode.
//!
//! Authentication is non-interactive (`BatchMode=yes`): the configured
//! identity file or the user's ssh agent must hold a key the server accepts.
//! `connect` runs a probe batch so credential and reachability problems surface
//! before any transfer starts.

use super::{checked, RemoteConnection, RemoteFileStore, RemoteMetadata, StoreError};
use crate::common::config::SftpSettings;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Executes one batch of sftp commands against the configured host.
#[async_trait]
pub trait SftpBackend: Send + Sync {
    async fn run_batch(
        &self,
        settings: &SftpSettings,
        commands: &[String],
    ) -> Result<CommandOutput, StoreError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSftp;

#[async_trait]
impl SftpBackend for SystemSftp {
    async fn run_batch(
        &self,
        settings: &SftpSettings,
        commands: &[String],
    ) -> Result<CommandOutput, StoreError> {
        let port = settings.port.to_string();
        let mut command = Command::new(&settings.sftp_binary);
        command
            .args(["-b", "-", "-P", port.as_str()])
            .args(["-o", "BatchMode=yes"])
            .args([
                "-o".to_string(),
                format!("ConnectTimeout={}", settings.connect_timeout_secs),
            ]);
        if let Some(identity) = &settings.identity_file {
            command.arg("-i").arg(identity);
        }
        command
            .arg(format!("{}@{}", settings.username, settings.host))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| StoreError::Connection {
            host: settings.host.clone(),
            reason: if e.kind() == std::io::ErrorKind::NotFound {
                format!("{} binary not found", settings.sftp_binary)
            } else {
                e.to_string()
            },
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let script = commands.join("\n") + "\n";
            stdin
                .write_all(script.as_bytes())
                .await
                .map_err(|e| StoreError::Connection {
                    host: settings.host.clone(),
                    reason: format!("failed to send sftp batch: {e}"),
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| StoreError::Connection {
                host: settings.host.clone(),
                reason: e.to_string(),
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Quote an argument for an sftp batch line.
fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn is_connection_failure(stderr: &str) -> bool {
    let normalized = stderr.to_lowercase();
    normalized.contains("connection refused")
        || normalized.contains("connection closed")
        || normalized.contains("connection reset")
        || normalized.contains("connection timed out")
        || normalized.contains("operation timed out")
        || normalized.contains("could not resolve hostname")
        || normalized.contains("network is unreachable")
}

fn is_auth_failure(stderr: &str) -> bool {
    let normalized = stderr.to_lowercase();
    normalized.contains("permission denied (")
        || normalized.contains("host key verification failed")
        || normalized.contains("too many authentication failures")
}

fn is_not_found(stderr: &str) -> bool {
    let normalized = stderr.to_lowercase();
    normalized.contains("not found") || normalized.contains("no such file")
}

/// Map a failed batch onto the store error taxonomy.
fn classify_failure(
    host: &str,
    operation: &'static str,
    path: &str,
    stderr: &str,
) -> StoreError {
    if is_auth_failure(stderr) {
        return StoreError::Authentication {
            host: host.to_string(),
            reason: stderr.trim().to_string(),
        };
    }
    if is_connection_failure(stderr) {
        return StoreError::Connection {
            host: host.to_string(),
            reason: stderr.trim().to_string(),
        };
    }
    if is_not_found(stderr) {
        return StoreError::NotFound(path.to_string());
    }
    StoreError::Operation {
        operation,
        path: path.to_string(),
        reason: stderr.trim().to_string(),
    }
}

/// Parse the size column of an `ls -l` line.
fn parse_size(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .filter(|line| !line.starts_with("sftp>"))
        .find_map(|line| line.split_whitespace().nth(4)?.parse().ok())
}

pub struct SftpStore<B: SftpBackend = SystemSftp> {
    settings: Arc<SftpSettings>,
    backend: Arc<B>,
}

impl SftpStore<SystemSftp> {
    pub fn new(settings: SftpSettings) -> Self {
        Self::with_backend(settings, SystemSftp)
    }
}

impl<B: SftpBackend + 'static> SftpStore<B> {
    pub fn with_backend(settings: SftpSettings, backend: B) -> Self {
        Self {
            settings: Arc::new(settings),
            backend: Arc::new(backend),
        }
    }
}

#[async_trait]
impl<B: SftpBackend + 'static> RemoteFileStore for SftpStore<B> {
    #[tracing::instrument(skip_all)]
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>, StoreError> {
        let probe = self
            .backend
            .run_batch(&self.settings, &["pwd".to_string()])
            .await?;
        if !probe.success {
            let host = self.describe();
            let reason = probe.stderr.trim().to_string();
            return Err(if is_auth_failure(&probe.stderr) {
                StoreError::Authentication { host, reason }
            } else {
                StoreError::Connection { host, reason }
            });
        }
        tracing::debug!(host = %self.settings.host, "SFTP connection verified");
        Ok(Box::new(SftpConnection {
            settings: self.settings.clone(),
            backend: self.backend.clone(),
        }))
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }
}

struct SftpConnection<B: SftpBackend> {
    settings: Arc<SftpSettings>,
    backend: Arc<B>,
}

impl<B: SftpBackend> SftpConnection<B> {
    async fn run(
        &self,
        operation: &'static str,
        path: &str,
        commands: Vec<String>,
    ) -> Result<CommandOutput, StoreError> {
        let output = self.backend.run_batch(&self.settings, &commands).await?;
        if output.success {
            Ok(output)
        } else {
            Err(classify_failure(
                &self.settings.host,
                operation,
                path,
                &output.stderr,
            ))
        }
    }
}

#[async_trait]
impl<B: SftpBackend + 'static> RemoteConnection for SftpConnection<B> {
    async fn upload(&mut self, local: &Path, remote: &str) -> Result<(), StoreError> {
        let remote = checked(remote)?;
        let local_arg = local.display().to_string();
        self.run(
            "upload",
            remote,
            vec![format!("put {} {}", quote(&local_arg), quote(remote))],
        )
        .await?;
        Ok(())
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<(), StoreError> {
        let (from, to) = (checked(from)?, checked(to)?);
        self.run(
            "rename",
            from,
            vec![format!("rename {} {}", quote(from), quote(to))],
        )
        .await?;
        Ok(())
    }

    async fn stat(&mut self, remote: &str) -> Result<RemoteMetadata, StoreError> {
        let remote = checked(remote)?;
        let output = self
            .run("stat", remote, vec![format!("ls -l {}", quote(remote))])
            .await?;
        Ok(RemoteMetadata {
            path: remote.to_string(),
            size: parse_size(&output.stdout),
        })
    }

    async fn download(&mut self, remote: &str, local: &Path) -> Result<(), StoreError> {
        let remote = checked(remote)?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(format!("create {}", parent.display()), e))?;
        }
        let local_arg = local.display().to_string();
        self.run(
            "download",
            remote,
            vec![format!("get {} {}", quote(remote), quote(&local_arg))],
        )
        .await?;
        Ok(())
    }

    async fn delete(&mut self, remote: &str) -> Result<(), StoreError> {
        let remote = checked(remote)?;
        self.run("delete", remote, vec![format!("rm {}", quote(remote))])
            .await?;
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), StoreError> {
        // each batch closed its own ssh transport
        tracing::debug!(host = %self.settings.host, "SFTP connection released");
        Ok(())
    }
}
