//! Builds one session document on disk from items appended one at a time.
//!
//! Each item is written to its own temp file, appended to the session's
//! fragment file in bounded chunks, and deleted. `wrap` then writes the final
//! document around the accumulated fragments.
//!
//! RAII: temp, fragment, and half-written output files are deleted on drop
//! unless consumed.

use super::naming::FileNamer;
use super::SessionError;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const COPY_CHUNK_SIZE: usize = 64 * 1024; // 64KB

pub const FRAGMENT_SUFFIX: &str = "_fragments.xml";
pub const ITEM_SUFFIX: &str = "_item.tmp";
pub const DOCUMENT_SUFFIX: &str = ".xml";

/// Deletes `path` on drop unless disarmed.
struct FileGuard {
    path: PathBuf,
    disarmed: bool,
}

impl FileGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            disarmed: false,
        }
    }

    fn disarm(mut self) -> PathBuf {
        self.disarmed = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        if !self.disarmed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to clean up session file"
                    );
                }
            }
        }
    }
}

pub struct Assembler {
    dir: PathBuf,
    namer: FileNamer,
    fragment: Option<FileGuard>,
}

impl Assembler {
    pub fn new(dir: PathBuf, namer: FileNamer) -> Self {
        Self {
            dir,
            namer,
            fragment: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fragment_path(&self) -> Option<&Path> {
        self.fragment.as_ref().map(|g| g.path.as_path())
    }

    /// Return the session fragment file, creating it on first use.
    pub async fn ensure_fragment_file(&mut self) -> Result<PathBuf, SessionError> {
        if let Some(guard) = &self.fragment {
            return Ok(guard.path.clone());
        }
        let (_, path) = self.create_unique(FRAGMENT_SUFFIX).await?;
        tracing::debug!(path = %path.display(), "Created session fragment file");
        self.fragment = Some(FileGuard::new(path.clone()));
        Ok(path)
    }

    /// Serialize `contents` to a temp file and append it to the fragment file.
    pub async fn append_item(&mut self, contents: &str) -> Result<(), SessionError> {
        let fragment = self.ensure_fragment_file().await?;

        let (mut file, tmp_path) = self.create_unique(ITEM_SUFFIX).await?;
        let tmp = FileGuard::new(tmp_path);
        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| SessionError::io(format!("write {}", tmp.path.display()), e))?;
        file.flush()
            .await
            .map_err(|e| SessionError::io(format!("flush {}", tmp.path.display()), e))?;
        drop(file);

        let copied = append_fragment(&fragment, &tmp.path).await?;
        tmp.disarm();
        tracing::debug!(bytes = copied, fragment = %fragment.display(), "Appended session item");
        Ok(())
    }

    /// Write header, authentication block, fragments, and footer to a new document.
    ///
    /// Consumes the fragment file. Fails with `NoBatchAdded` when nothing was appended.
    pub async fn wrap(
        &mut self,
        header: &str,
        authentication: &str,
        footer: &str,
    ) -> Result<PathBuf, SessionError> {
        let fragment = self.fragment.take().ok_or(SessionError::NoBatchAdded)?;
        let (mut out, out_path) = self.create_unique(DOCUMENT_SUFFIX).await?;
        let output = FileGuard::new(out_path);
        let ctx = |action: &str| format!("{action} {}", output.path.display());

        out.write_all(header.as_bytes())
            .await
            .map_err(|e| SessionError::io(ctx("write header to"), e))?;
        out.write_all(authentication.as_bytes())
            .await
            .map_err(|e| SessionError::io(ctx("write authentication to"), e))?;

        let mut body = File::open(&fragment.path)
            .await
            .map_err(|e| SessionError::io(format!("open {}", fragment.path.display()), e))?;
        copy_chunked(&mut body, &mut out)
            .await
            .map_err(|e| SessionError::io(ctx("copy fragments into"), e))?;
        drop(body);

        out.write_all(footer.as_bytes())
            .await
            .map_err(|e| SessionError::io(ctx("write footer to"), e))?;
        out.flush()
            .await
            .map_err(|e| SessionError::io(ctx("flush"), e))?;
        out.sync_all()
            .await
            .map_err(|e| SessionError::io(ctx("sync"), e))?;

        fs::remove_file(&fragment.path)
            .await
            .map_err(|e| SessionError::io(format!("remove {}", fragment.path.display()), e))?;
        fragment.disarm();

        Ok(output.disarm())
    }

    /// Drop accumulated fragments, deleting the fragment file.
    pub fn discard(&mut self) {
        self.fragment = None;
    }

    async fn create_unique(&mut self, suffix: &str) -> Result<(File, PathBuf), SessionError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SessionError::io(format!("create {}", self.dir.display()), e))?;

        loop {
            let path = self.dir.join(self.namer.next_name(suffix));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((file, path)),
                // Only reachable with a reused seed; draw the next id.
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(SessionError::io(format!("create {}", path.display()), e)),
            }
        }
    }
}

/// Append all of `source_path` onto `fragment_path`, then delete the source.
///
/// Returns the number of bytes appended. On failure the fragment file is cut
/// back to its previous length and the source is left in place.
pub async fn append_fragment(
    fragment_path: &Path,
    source_path: &Path,
) -> Result<u64, SessionError> {
    let mut source = File::open(source_path)
        .await
        .map_err(|e| SessionError::io(format!("open {}", source_path.display()), e))?;
    let copied = append_from(fragment_path, &mut source).await?;
    drop(source);

    fs::remove_file(source_path)
        .await
        .map_err(|e| SessionError::io(format!("remove {}", source_path.display()), e))?;
    Ok(copied)
}

async fn append_from<R>(fragment_path: &Path, source: &mut R) -> Result<u64, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut dest = OpenOptions::new()
        .append(true)
        .open(fragment_path)
        .await
        .map_err(|e| SessionError::io(format!("open {}", fragment_path.display()), e))?;
    let previous_len = dest
        .metadata()
        .await
        .map_err(|e| SessionError::io(format!("stat {}", fragment_path.display()), e))?
        .len();

    let appended = async {
        let copied = copy_chunked(source, &mut dest).await?;
        dest.flush().await?;
        Ok::<_, std::io::Error>(copied)
    }
    .await;

    match appended {
        Ok(copied) => Ok(copied),
        Err(e) => {
            // Drop the partial item so the body only holds whole fragments.
            if let Err(trunc) = dest.set_len(previous_len).await {
                tracing::warn!(
                    path = %fragment_path.display(),
                    error = %trunc,
                    "Failed to roll back partial append"
                );
            }
            Err(SessionError::io(format!("append to {}", fragment_path.display()), e))
        }
    }
}

async fn copy_chunked<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n]).await?;
        total += n as u64;
    }
    Ok(total)
}
