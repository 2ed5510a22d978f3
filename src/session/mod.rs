//! Session accumulation: items are serialized to disk as they arrive and wrapped
//! into one envelope document on finalize.

pub mod assembler;
pub mod builder;
pub mod envelope;
pub mod items;
pub mod naming;

pub use assembler::Assembler;
pub use builder::{SessionBuilder, SessionMode};
pub use items::{BatchItem, ResponseRequest};
pub use naming::FileNamer;

use crate::common::config::{AppConfig, Credentials, PROTOCOL_VERSION};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no batch was added")]
    NoBatchAdded,
    #[error("session already finalized: no batch was added since the last finalize")]
    AlreadyFinalized,
    #[error("cannot add a {attempted} to a session that already holds a {existing}")]
    MixedRequest {
        attempted: &'static str,
        existing: &'static str,
    },
    #[error("a session may contain only one response request")]
    DuplicateResponseRequest,
    #[error("session file error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Settings a session needs, fixed at builder construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub request_dir: PathBuf,
    pub credentials: Credentials,
    pub merchant_id: String,
    pub report_group: String,
    pub version: String,
}

impl From<&AppConfig> for SessionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            request_dir: config.session.request_dir.clone(),
            credentials: config.credentials.clone(),
            merchant_id: config.session.merchant_id.clone(),
            report_group: config.session.report_group.clone(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}
