//! Error types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a whole invocation
#[derive(Debug, Error)]
pub enum UndoError {
    /// The activity log could not be opened at all
    #[error("Cannot read log {path}: {source}")]
    LogUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cascade target id is not in the record list
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// Cascade target index is past the end of the record list
    #[error("Index {index} out of range for {len} operations")]
    IndexOutOfRange { index: usize, len: usize },

    /// Storage error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Local session error
    #[error("Session error: {0}")]
    SessionError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Why a single record could not be reversed or reapplied.
///
/// These never abort a cascade; the engine folds them into an
/// [`OperationOutcome`](crate::engine::OperationOutcome).
#[derive(Debug, Error)]
pub enum ReversalError {
    /// Expected substring or path is absent
    #[error("{0}")]
    NotFound(String),

    /// Create or rename target already exists
    #[error("{0}")]
    AlreadyExists(String),

    /// No snapshot or recorded content to restore from
    #[error("{0}")]
    ContentUnavailable(String),

    /// Shell commands are never reversed automatically
    #[error("{0}")]
    Unsupported(String),

    /// Underlying filesystem fault
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ReversalError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Taxonomy tag for this failure
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::NotFound,
            Self::AlreadyExists(_) => FailureKind::AlreadyExists,
            Self::ContentUnavailable(_) => FailureKind::ContentUnavailable,
            Self::Unsupported(_) => FailureKind::Unsupported,
            Self::Io { .. } => FailureKind::Io,
        }
    }
}

/// Per-record failure category carried on outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    AlreadyExists,
    ContentUnavailable,
    Unsupported,
    Io,
}
