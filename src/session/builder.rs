//! Stateful session accumulator.

use super::assembler::Assembler;
use super::envelope;
use super::items::{BatchItem, ResponseRequest};
use super::naming::FileNamer;
use super::{SessionConfig, SessionError};
use std::path::{Path, PathBuf};

const BATCH: &str = "batch";
const RESPONSE_REQUEST: &str = "response request";

/// A session holds batches or exactly one response request, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Empty,
    BatchAccumulating,
    SingleResponseRequest,
    Finalized,
}

pub struct SessionBuilder {
    config: SessionConfig,
    assembler: Assembler,
    batch_count: usize,
    mode: SessionMode,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_namer(config, FileNamer::from_entropy())
    }

    /// Builder whose file names come from `namer`.
    pub fn with_namer(config: SessionConfig, namer: FileNamer) -> Self {
        let assembler = Assembler::new(config.request_dir.clone(), namer);
        Self {
            config,
            assembler,
            batch_count: 0,
            mode: SessionMode::Empty,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Fragment file of the session in progress, if any item was added.
    pub fn fragment_path(&self) -> Option<&Path> {
        self.assembler.fragment_path()
    }

    #[tracing::instrument(skip_all)]
    pub async fn add_batch(&mut self, mut item: BatchItem) -> Result<(), SessionError> {
        self.reopen_if_finalized();
        if self.mode == SessionMode::SingleResponseRequest {
            return Err(SessionError::MixedRequest {
                attempted: BATCH,
                existing: RESPONSE_REQUEST,
            });
        }

        item.apply_default_report_group(&self.config.report_group);
        self.assembler.append_item(&item.serialize()).await?;

        self.batch_count += 1;
        self.mode = SessionMode::BatchAccumulating;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub async fn add_response_request(
        &mut self,
        request: &ResponseRequest,
    ) -> Result<(), SessionError> {
        self.reopen_if_finalized();
        match self.mode {
            SessionMode::BatchAccumulating => {
                return Err(SessionError::MixedRequest {
                    attempted: RESPONSE_REQUEST,
                    existing: BATCH,
                })
            }
            SessionMode::SingleResponseRequest => {
                return Err(SessionError::DuplicateResponseRequest)
            }
            SessionMode::Empty | SessionMode::Finalized => {}
        }

        let xml = request.serialize(&self.config.merchant_id);
        self.assembler.append_item(&xml).await?;

        self.mode = SessionMode::SingleResponseRequest;
        Ok(())
    }

    /// Wrap the accumulated items into the finished document and return its path.
    ///
    /// Destructive: the builder is `Finalized` afterwards and the next add
    /// starts a new session. On I/O failure the session's fragments are dropped.
    #[tracing::instrument(skip_all)]
    pub async fn finalize(&mut self) -> Result<PathBuf, SessionError> {
        match self.mode {
            SessionMode::Empty => return Err(SessionError::NoBatchAdded),
            SessionMode::Finalized => return Err(SessionError::AlreadyFinalized),
            SessionMode::BatchAccumulating | SessionMode::SingleResponseRequest => {}
        }

        let header = envelope::header(&self.config.version, self.batch_count);
        let authentication = envelope::authentication_block(&self.config.credentials);
        let result = self
            .assembler
            .wrap(&header, &authentication, &envelope::footer())
            .await;

        match result {
            Ok(path) => {
                tracing::info!(
                    path = %path.display(),
                    batches = self.batch_count,
                    "Session document finalized"
                );
                self.batch_count = 0;
                self.mode = SessionMode::Finalized;
                Ok(path)
            }
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    /// Abandon the session in progress and delete its fragments.
    pub fn reset(&mut self) {
        self.assembler.discard();
        self.batch_count = 0;
        self.mode = SessionMode::Empty;
    }

    fn reopen_if_finalized(&mut self) {
        if self.mode == SessionMode::Finalized {
            self.mode = SessionMode::Empty;
        }
    }
}
