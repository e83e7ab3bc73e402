use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::apply::{resolve_hunks, splice};
use crate::diff::{diff_summary, DiffSummary};
use crate::error::PatchError;
use crate::hunk::Hunk;
use crate::persist::{content_hash, hash_matches, write_atomic};

/// A set of hunks to apply to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub hunks: Vec<Hunk>,
    /// Hash of the content the hunks were written against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_hash: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl PatchRequest {
    #[must_use]
    pub fn new(hunks: Vec<Hunk>) -> Self {
        Self {
            hunks,
            expected_hash: None,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_expected_hash(mut self, hash: impl Into<String>) -> Self {
        self.expected_hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub path: PathBuf,
    /// False for dry runs.
    pub written: bool,
    pub hunks_applied: usize,
    pub previous_hash: String,
    pub new_hash: String,
    pub new_content: String,
    pub diff: DiffSummary,
}

/// Reads `path`, applies `request` against that single snapshot, and persists the
/// result atomically unless the request is a dry run.
///
/// Dry runs only resolve and apply hunks; the hash precondition and persistence are
/// skipped.
pub fn patch_file(path: &Path, request: &PatchRequest) -> Result<PatchOutcome, PatchError> {
    let bytes = fs::read(path).map_err(|source| PatchError::io("reading", path, source))?;
    let previous_hash = content_hash(&bytes);
    let original = String::from_utf8(bytes).map_err(|_| PatchError::NotUtf8 {
        path: path.to_path_buf(),
    })?;

    if !request.dry_run {
        if let Some(expected) = &request.expected_hash {
            if !hash_matches(expected, &previous_hash) {
                return Err(PatchError::PreconditionMismatch {
                    path: path.to_path_buf(),
                    expected: expected.clone(),
                    actual: previous_hash,
                });
            }
        }
    }

    let resolved = resolve_hunks(&original, &request.hunks)?;
    let new_content = splice(&original, &resolved);
    let diff = diff_summary(&path.display().to_string(), &original, &new_content);
    let new_hash = content_hash(new_content.as_bytes());

    if request.dry_run {
        debug!(path = %path.display(), hunks = resolved.len(), "dry-run patch resolved");
    } else {
        write_atomic(path, new_content.as_bytes())?;
        info!(
            path = %path.display(),
            hunks = resolved.len(),
            added = diff.lines_added,
            removed = diff.lines_removed,
            "patch applied"
        );
    }

    Ok(PatchOutcome {
        path: path.to_path_buf(),
        written: !request.dry_run,
        hunks_applied: resolved.len(),
        previous_hash,
        new_hash,
        new_content,
        diff,
    })
}
