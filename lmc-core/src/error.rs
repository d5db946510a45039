//! Error types for the stores and the orchestrator.

use lmc_engine::{AssemblyError, ValidationError};
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the breakpoint and artifact stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("invalid breakpoint address {0}: must be within 0..=99")]
    InvalidAddress(i64),

    #[error("invalid content address `{0}`")]
    InvalidContentAddress(String),

    #[error("{kind} `{name}` not found")]
    NotFound { kind: &'static str, name: String },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read or write {path:?}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("bundle format version {found} is newer than supported version {supported}")]
    Version { found: u32, supported: u32 },

    #[error("malformed bundle: {0}")]
    Bundle(#[source] serde_json::Error),

    #[error("malformed artifact {path:?}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("invalid machine image: {0}")]
    Image(#[from] ValidationError),

    #[error("assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Missing artifact or breakpoint set; the caller may offer to create one.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Rejected input that the caller can correct and retry.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidName { .. }
                | StoreError::InvalidAddress(_)
                | StoreError::InvalidContentAddress(_)
        )
    }
}

/// Failures that prevent a run from starting.
///
/// Once a run is executing, every ending (including engine errors and
/// cancellation) is reported through [`crate::Termination`] instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid speed {0}: cycles per second must be a positive finite rate")]
    InvalidSpeed(f64),

    #[error("cycle count must be at least 1")]
    InvalidCount,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot resume from invalid state: {0}")]
    State(#[from] ValidationError),

    #[error("run task failed: {0}")]
    Join(String),
}
