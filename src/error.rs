use std::path::PathBuf;

use patch_editor::PatchError;
use session_manager::SessionError;
use symbol_index::IndexError;
use thiserror::Error;

/// Recoverable failure of one tool call. The dispatcher folds every variant into a
/// `success: false` outcome returned to the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool {name:?} is not enabled in this run")]
    NotWhitelisted { name: String },

    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("path escapes workspace root: {path}")]
    PathEscape { path: PathBuf },

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("{path} already exists; use edit_file to modify existing files")]
    AlreadyExists { path: PathBuf },

    #[error("I/O error while {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Symbols(#[from] IndexError),

    #[error("{0}")]
    CommandFailed(String),
}

impl ToolError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// The operator vetoed a destructive call. Fatal for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("permission denied for {tool}; the operator aborted the run")]
pub struct PermissionDenied {
    pub tool: String,
}
