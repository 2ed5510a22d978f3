//! Remote path layout and validation.
//!
//! Requests go up as `inbound/<name>.prg` and become visible as
//! `inbound/<name>.asc` only after the upload completes. The processor's
//! result appears as `outbound/<name>.asc`.

use std::fmt;
use std::path::{Component, Path};

pub const INBOUND_DIR: &str = "inbound";
pub const OUTBOUND_DIR: &str = "outbound";
pub const IN_FLIGHT_SUFFIX: &str = ".prg";
pub const READY_SUFFIX: &str = ".asc";

/// Where a request is written while the upload is in progress.
pub fn inbound_in_flight(name: &str) -> String {
    format!("{INBOUND_DIR}/{name}{IN_FLIGHT_SUFFIX}")
}

/// Where a fully uploaded request becomes visible to the processor.
pub fn inbound_ready(name: &str) -> String {
    format!("{INBOUND_DIR}/{name}{READY_SUFFIX}")
}

/// Where the processor publishes the result for `name`.
pub fn outbound_result(name: &str) -> String {
    format!("{OUTBOUND_DIR}/{name}{READY_SUFFIX}")
}

#[derive(Debug, PartialEq, Eq)]
pub enum PathValidationError {
    ContainsParentDir,
    AbsolutePath,
    InvalidComponent,
    NullByte,
    LineBreak,
    Empty,
}

impl fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathValidationError::ContainsParentDir => {
                write!(f, "Path contains parent directory (..)")
            }
            PathValidationError::AbsolutePath => write!(f, "Path is absolute"),
            PathValidationError::InvalidComponent => write!(f, "Path contains invalid component"),
            PathValidationError::NullByte => write!(f, "Path contains null byte"),
            PathValidationError::LineBreak => write!(f, "Path contains a line break"),
            PathValidationError::Empty => write!(f, "Path is empty"),
        }
    }
}

impl std::error::Error for PathValidationError {}

/// Validate a store-relative path: no traversal, no absolute roots, no bytes
/// that would break a batch command line.
pub fn validate_remote_path(path: &str) -> Result<(), PathValidationError> {
    if path.is_empty() {
        return Err(PathValidationError::Empty);
    }

    // C-style APIs stop at \0
    if path.contains('\0') {
        return Err(PathValidationError::NullByte);
    }

    if path.contains('\n') || path.contains('\r') {
        return Err(PathValidationError::LineBreak);
    }

    if Path::new(path).is_absolute() {
        return Err(PathValidationError::AbsolutePath);
    }

    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => continue,
            Component::ParentDir => return Err(PathValidationError::ContainsParentDir),
            Component::RootDir => return Err(PathValidationError::AbsolutePath),
            Component::Prefix(_) => return Err(PathValidationError::InvalidComponent),
        }
    }

    Ok(())
}
