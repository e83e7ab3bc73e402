use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::ToolError;

/// Directory boundary for every path argument a tool receives.
///
/// Relative paths resolve against the root. Existing paths are canonicalized; paths
/// that do not exist yet are checked through their nearest existing ancestor, so
/// symlinks cannot lead a tool outside the root either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ToolError> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|source| ToolError::io("resolving workspace root", root, source))?;

        if !canonical.is_dir() {
            return Err(ToolError::invalid_path(
                canonical.display().to_string(),
                "workspace root must be a directory",
            ));
        }

        Ok(Self { root: canonical })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a path that must already exist.
    pub fn resolve_existing(&self, path: &str) -> Result<PathBuf, ToolError> {
        let candidate = self.candidate(path)?;
        let canonical = candidate
            .canonicalize()
            .map_err(|source| ToolError::io("resolving", &candidate, source))?;

        self.ensure_inside(&canonical)?;
        Ok(canonical)
    }

    /// Resolves an existing entry without following it when it is a symlink.
    ///
    /// Only the parent directory is canonicalized, so the result names the link
    /// itself rather than its target.
    pub fn resolve_entry(&self, path: &str) -> Result<PathBuf, ToolError> {
        let candidate = self.candidate(path)?;
        if candidate.components().any(|part| part == Component::ParentDir) {
            return Err(ToolError::PathEscape { path: candidate });
        }

        let normalized: PathBuf = candidate.components().collect();
        let (Some(parent), Some(name)) = (normalized.parent(), normalized.file_name()) else {
            return Err(ToolError::invalid_path(path, "path has no parent directory"));
        };
        let parent = parent
            .canonicalize()
            .map_err(|source| ToolError::io("resolving", parent, source))?;
        let entry = parent.join(name);
        self.ensure_inside(&entry)?;

        fs::symlink_metadata(&entry).map_err(|source| ToolError::io("resolving", &entry, source))?;
        Ok(entry)
    }

    /// Resolves a path that may not exist yet, such as a file about to be created.
    pub fn resolve_new(&self, path: &str) -> Result<PathBuf, ToolError> {
        let candidate = self.candidate(path)?;
        if candidate.components().any(|part| part == Component::ParentDir) {
            return Err(ToolError::PathEscape { path: candidate });
        }

        let parent = candidate.parent().ok_or_else(|| {
            ToolError::invalid_path(path, "path has no parent directory and cannot be written")
        })?;

        let anchor = canonicalize_existing_ancestor(parent)?;
        self.ensure_inside(&anchor)?;

        Ok(candidate)
    }

    /// `path` relative to the root when it lies inside it.
    #[must_use]
    pub fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(|relative| {
                if relative.as_os_str().is_empty() {
                    ".".to_string()
                } else {
                    relative.display().to_string()
                }
            })
            .unwrap_or_else(|_| path.display().to_string())
    }

    fn candidate(&self, path: &str) -> Result<PathBuf, ToolError> {
        if path.trim().is_empty() {
            return Err(ToolError::invalid_path(path, "path must not be empty"));
        }

        let path = Path::new(path);
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        })
    }

    fn ensure_inside(&self, canonical: &Path) -> Result<(), ToolError> {
        if canonical.starts_with(&self.root) {
            Ok(())
        } else {
            Err(ToolError::PathEscape {
                path: canonical.to_path_buf(),
            })
        }
    }
}

fn canonicalize_existing_ancestor(path: &Path) -> Result<PathBuf, ToolError> {
    for ancestor in path.ancestors() {
        if ancestor.exists() {
            return ancestor
                .canonicalize()
                .map_err(|source| ToolError::io("resolving", ancestor, source));
        }
    }

    Err(ToolError::invalid_path(
        path.display().to_string(),
        "no existing ancestor directory",
    ))
}
