use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::PatchError;

/// Hex-encoded SHA-256 of `content`, the form expected by edit preconditions.
#[must_use]
pub fn content_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Compares a caller-supplied hash with a computed one, tolerating a `sha256:`
/// prefix and upper-case hex.
#[must_use]
pub fn hash_matches(expected: &str, actual: &str) -> bool {
    let expected = expected.trim();
    let expected = expected.strip_prefix("sha256:").unwrap_or(expected);
    expected.eq_ignore_ascii_case(actual)
}

/// Replaces `path` with `contents` through a temporary file in the same directory
/// followed by a rename, so readers observe either the old or the new file.
///
/// The temporary file is removed on every failure path. Existing permissions of the
/// target are carried over.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PatchError> {
    let temp = stage(path, contents)?;

    if let Ok(metadata) = fs::metadata(path) {
        if metadata.is_file() {
            temp.as_file()
                .set_permissions(metadata.permissions())
                .map_err(|source| PatchError::io("copying permissions of", path, source))?;
        }
    }

    temp.persist(path)
        .map_err(|error| PatchError::io("renaming temporary file over", path, error.error))?;

    debug!(path = %path.display(), bytes = contents.len(), "atomic write complete");
    Ok(())
}

/// Like [`write_atomic`], but fails with [`PatchError::AlreadyExists`] instead of
/// replacing an entry that appeared at `path` in the meantime.
pub fn write_atomic_new(path: &Path, contents: &[u8]) -> Result<(), PatchError> {
    let temp = stage(path, contents)?;

    temp.persist_noclobber(path).map_err(|error| {
        if error.error.kind() == ErrorKind::AlreadyExists {
            PatchError::AlreadyExists {
                path: path.to_path_buf(),
            }
        } else {
            PatchError::io("moving temporary file to", path, error.error)
        }
    })?;

    debug!(path = %path.display(), bytes = contents.len(), "atomic create complete");
    Ok(())
}

fn stage(path: &Path, contents: &[u8]) -> Result<NamedTempFile, PatchError> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(directory)
        .map_err(|source| PatchError::io("creating temporary file in", directory, source))?;

    temp.write_all(contents)
        .map_err(|source| PatchError::io("writing temporary file for", path, source))?;
    temp.as_file()
        .sync_all()
        .map_err(|source| PatchError::io("syncing temporary file for", path, source))?;
    Ok(temp)
}
