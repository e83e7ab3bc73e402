use std::path::PathBuf;

use thiserror::Error;

use crate::hunk::EditOperation;

/// Failure while resolving, applying or persisting a patch.
///
/// Hunk numbers are 1-based positions in the request.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patch contains no hunks")]
    EmptyPatch,

    #[error("hunk {hunk}: anchor {pattern:?} not found ({found} match(es) in file)")]
    AnchorNotFound {
        hunk: usize,
        pattern: String,
        found: usize,
    },

    #[error(
        "hunk {hunk}: anchor {pattern:?} is ambiguous ({matches} matches); set occurrence to first, last or nth"
    )]
    AmbiguousAnchor {
        hunk: usize,
        pattern: String,
        matches: usize,
    },

    #[error("hunks {first} and {second} resolve to overlapping ranges of the original content")]
    OverlappingHunks { first: usize, second: usize },

    #[error("content hash precondition failed for {path}: expected {expected}, found {actual}")]
    PreconditionMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("hunk {hunk}: invalid anchor: {reason}")]
    InvalidAnchor { hunk: usize, reason: String },

    #[error("hunk {hunk}: {operation} requires content")]
    MissingContent {
        hunk: usize,
        operation: EditOperation,
    },

    #[error("{path} already exists")]
    AlreadyExists { path: PathBuf },

    #[error("{path} is not valid UTF-8 text")]
    NotUtf8 { path: PathBuf },

    #[error("I/O error while {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn invalid_anchor(hunk: usize, reason: impl Into<String>) -> Self {
        Self::InvalidAnchor {
            hunk,
            reason: reason.into(),
        }
    }
}
