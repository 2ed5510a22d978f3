//! GnuPG-backed crypto engine.

use super::{ensure_readable, CryptoEngine, CryptoError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct CommandOutput {
    pub success: bool,
    pub stderr: String,
}

/// Runs one gpg invocation. Split out so tests can script gpg's replies.
#[async_trait]
pub trait GpgBackend: Send + Sync {
    async fn run(
        &self,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, CryptoError>;
}

/// The system `gpg` binary, optionally bound to a dedicated home directory.
#[derive(Debug, Clone)]
pub struct SystemGpg {
    binary: String,
    home: Option<PathBuf>,
}

impl SystemGpg {
    pub fn new(binary: impl Into<String>, home: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            home,
        }
    }
}

impl Default for SystemGpg {
    fn default() -> Self {
        Self::new("gpg", None)
    }
}

#[async_trait]
impl GpgBackend for SystemGpg {
    async fn run(
        &self,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, CryptoError> {
        let mut command = Command::new(&self.binary);
        if let Some(home) = &self.home {
            command.arg("--homedir").arg(home);
        }
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CryptoError::BinaryMissing(self.binary.clone())
            } else {
                CryptoError::Other(e.to_string())
            }
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| CryptoError::Other(format!("failed to write to gpg stdin: {e}")))?;
            // closing stdin lets gpg read EOF after the passphrase
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CryptoError::Other(e.to_string()))?;

        Ok(CommandOutput {
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Map gpg's stderr onto the crypto error categories callers distinguish.
fn classify_failure(stderr: &str, input: &Path, recipient: Option<&str>) -> CryptoError {
    let normalized = stderr.to_lowercase();

    if normalized.contains("bad passphrase") || normalized.contains("bad session key") {
        return CryptoError::BadPassphrase;
    }

    if normalized.contains("no secret key") || normalized.contains("secret key not available") {
        return CryptoError::NoSecretKey;
    }

    if let Some(recipient) = recipient {
        if normalized.contains("no public key")
            || normalized.contains("public key not found")
            || normalized.contains("unusable public key")
            || normalized.contains("skipped: no public key")
        {
            return CryptoError::RecipientKeyNotFound(recipient.to_string());
        }
    }

    if normalized.contains("can't open") || normalized.contains("no such file") {
        return CryptoError::InputUnreadable(input.to_path_buf());
    }

    CryptoError::Other(stderr.trim().to_string())
}

pub struct GpgEngine<B: GpgBackend = SystemGpg> {
    backend: B,
}

impl GpgEngine<SystemGpg> {
    pub fn system(binary: impl Into<String>, home: Option<PathBuf>) -> Self {
        Self::with_backend(SystemGpg::new(binary, home))
    }
}

impl<B: GpgBackend> GpgEngine<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    fn base_args() -> Vec<String> {
        ["--batch", "--yes", "--quiet", "--no-tty", "--no-secmem-warning"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

#[async_trait]
impl<B: GpgBackend> CryptoEngine for GpgEngine<B> {
    #[tracing::instrument(
        skip(self, input, output),
        fields(input = %input.display(), output = %output.display())
    )]
    async fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        recipient_key_id: &str,
    ) -> Result<(), CryptoError> {
        ensure_readable(input).await?;

        let mut args = Self::base_args();
        args.extend([
            "--trust-model".to_string(),
            "always".to_string(),
            "--armor".to_string(),
            "--recipient".to_string(),
            recipient_key_id.to_string(),
            "--output".to_string(),
            output.display().to_string(),
            "--encrypt".to_string(),
            input.display().to_string(),
        ]);

        let result = self.backend.run(&args, None).await?;
        if !result.success {
            return Err(classify_failure(&result.stderr, input, Some(recipient_key_id)));
        }
        tracing::debug!("Encrypted document for recipient {}", recipient_key_id);
        Ok(())
    }

    #[tracing::instrument(
        skip(self, input, output, passphrase),
        fields(input = %input.display(), output = %output.display())
    )]
    async fn decrypt(
        &self,
        input: &Path,
        output: &Path,
        passphrase: &str,
    ) -> Result<(), CryptoError> {
        ensure_readable(input).await?;

        let mut args = Self::base_args();
        args.extend([
            "--pinentry-mode".to_string(),
            "loopback".to_string(),
            "--passphrase-fd".to_string(),
            "0".to_string(),
            "--output".to_string(),
            output.display().to_string(),
            "--decrypt".to_string(),
            input.display().to_string(),
        ]);

        let result = self.backend.run(&args, Some(passphrase)).await?;
        if !result.success {
            return Err(classify_failure(&result.stderr, input, None));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, key_file), fields(key_file = %key_file.display()))]
    async fn import_key(&self, key_file: &Path) -> Result<(), CryptoError> {
        ensure_readable(key_file).await?;

        let mut args = Self::base_args();
        args.extend(["--import".to_string(), key_file.display().to_string()]);

        let result = self.backend.run(&args, None).await?;
        if !result.success {
            return Err(classify_failure(&result.stderr, key_file, None));
        }
        tracing::info!("Imported key material");
        Ok(())
    }
}
