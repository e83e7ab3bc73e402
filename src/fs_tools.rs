//! Plain filesystem tools. Every path goes through the [`Workspace`] boundary.

use std::fs;
use std::io::Read;
use std::path::Path;

use patch_editor::{content_hash, patch_file, write_atomic_new, PatchError, PatchRequest};
use regex::Regex;
use serde::Deserialize;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::ToolError;
use crate::format::{EMPTY_DIRECTORY, NO_MATCHES};
use crate::schema::{READ_FILE, SEARCH_CONTEXT};
use crate::workspace::Workspace;

pub const READ_MAX_BYTES: usize = 200 * 1024;
pub const SEARCH_MAX_RESULTS: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReadFileArgs {
    pub path: String,
    /// 1-based inclusive line ranges.
    #[serde(default)]
    pub ranges: Option<Vec<(usize, usize)>>,
    /// Single-window shorthand for `ranges`; either bound may be left open.
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
    /// Caps the returned text instead of refusing large files.
    #[serde(default)]
    pub max_bytes: Option<usize>,
    #[serde(default)]
    pub with_metadata: bool,
}

impl ReadFileArgs {
    fn line_window(&self, line_count: usize) -> Result<Option<Vec<(usize, usize)>>, ToolError> {
        match (&self.ranges, self.start_line, self.end_line) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(ToolError::invalid_arguments(
                READ_FILE,
                "use either ranges or start_line/end_line, not both",
            )),
            (Some(ranges), None, None) => Ok(Some(ranges.clone())),
            (None, None, None) => Ok(None),
            (None, start, end) => Ok(Some(vec![(start.unwrap_or(1), end.unwrap_or(line_count))])),
        }
    }

    fn selects_lines(&self) -> bool {
        self.ranges.is_some() || self.start_line.is_some() || self.end_line.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListDirectoryArgs {
    #[serde(default = "current_dir")]
    pub path: String,
    #[serde(default = "yes")]
    pub show_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchArgs {
    pub pattern: String,
    #[serde(default = "current_dir")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateFileArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditFileArgs {
    pub path: String,
    #[serde(flatten)]
    pub request: PatchRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeletePathArgs {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

fn current_dir() -> String {
    ".".to_string()
}

fn yes() -> bool {
    true
}

pub fn read_file(workspace: &Workspace, args: &ReadFileArgs) -> Result<String, ToolError> {
    let resolved = workspace.resolve_existing(&args.path)?;
    let metadata =
        fs::metadata(&resolved).map_err(|source| ToolError::io("inspecting", &resolved, source))?;
    if metadata.is_dir() {
        return Err(ToolError::invalid_path(&args.path, "is a directory"));
    }

    let file_len = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
    let whole_file = !args.selects_lines();
    if whole_file && args.max_bytes.is_none() && file_len > READ_MAX_BYTES {
        return Err(ToolError::invalid_arguments(
            READ_FILE,
            format!(
                "file exceeds max read size ({file_len} bytes > {READ_MAX_BYTES} bytes); read line ranges or set max_bytes"
            ),
        ));
    }

    let bytes = match args.max_bytes {
        Some(limit) if whole_file => read_prefix(&resolved, limit)?,
        _ => fs::read(&resolved).map_err(|source| ToolError::io("reading", &resolved, source))?,
    };
    let content = decode_text(bytes, whole_file && args.max_bytes.is_some()).ok_or_else(|| {
        ToolError::invalid_path(workspace.display(&resolved), "file is not valid UTF-8 text")
    })?;

    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let mut selected = match args.line_window(lines.len())? {
        None => content.clone(),
        Some(ranges) => select_lines(&lines, &ranges)?,
    };

    let available = if whole_file { file_len } else { selected.len() };
    if let Some(limit) = args.max_bytes {
        if available > limit {
            truncate_at_char_boundary(&mut selected, limit);
            selected.push_str(&format!("\n[truncated at {limit} bytes]"));
        }
    }

    if args.with_metadata {
        let header = metadata_header(&workspace.display(&resolved), &metadata, lines.len());
        selected.insert_str(0, &header);
    }
    Ok(selected)
}

fn select_lines(lines: &[&str], ranges: &[(usize, usize)]) -> Result<String, ToolError> {
    let mut selected = String::new();
    for &(start, end) in ranges {
        if start < 1 || end > lines.len() || start > end {
            return Err(ToolError::invalid_arguments(
                READ_FILE,
                format!(
                    "invalid range ({start}, {end}), file has {} lines",
                    lines.len()
                ),
            ));
        }
        for line in &lines[start - 1..end] {
            selected.push_str(line);
        }
    }
    Ok(selected)
}

fn read_prefix(path: &Path, limit: usize) -> Result<Vec<u8>, ToolError> {
    let file = fs::File::open(path).map_err(|source| ToolError::io("opening", path, source))?;
    let mut bytes = Vec::with_capacity(limit.min(READ_MAX_BYTES));
    file.take(u64::try_from(limit).unwrap_or(u64::MAX))
        .read_to_end(&mut bytes)
        .map_err(|source| ToolError::io("reading", path, source))?;
    Ok(bytes)
}

/// UTF-8 text of `bytes`. A prefix read may end inside a character; that tail is
/// dropped rather than treated as binary content.
fn decode_text(bytes: Vec<u8>, prefix: bool) -> Option<String> {
    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(error) if prefix && error.utf8_error().error_len().is_none() => {
            let valid = error.utf8_error().valid_up_to();
            let mut bytes = error.into_bytes();
            bytes.truncate(valid);
            String::from_utf8(bytes).ok()
        }
        Err(_) => None,
    }
}

fn truncate_at_char_boundary(text: &mut String, limit: usize) {
    let mut cutoff = limit.min(text.len());
    while cutoff > 0 && !text.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    text.truncate(cutoff);
}

fn metadata_header(display: &str, metadata: &fs::Metadata, line_count: usize) -> String {
    let modified = metadata
        .modified()
        .ok()
        .map(OffsetDateTime::from)
        .and_then(|time| {
            time.format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
            ))
            .ok()
        })
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "path: {display}\nsize: {} bytes\nlines: {line_count}\nmodified: {modified}\npermissions: {}\n---\n",
        metadata.len(),
        permission_string(metadata)
    )
}

/// `ls -l` style listing sorted by name.
pub fn list_directory(workspace: &Workspace, args: &ListDirectoryArgs) -> Result<String, ToolError> {
    let resolved = workspace.resolve_existing(&args.path)?;
    if !resolved.is_dir() {
        return Err(ToolError::invalid_path(&args.path, "not a directory"));
    }

    let mut names: Vec<String> = fs::read_dir(&resolved)
        .map_err(|source| ToolError::io("listing", &resolved, source))?
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| args.show_hidden || !name.starts_with('.'))
        .collect();
    names.sort();

    if names.is_empty() {
        return Ok(EMPTY_DIRECTORY.to_string());
    }

    let entries: Vec<String> = names
        .iter()
        .map(|name| match fs::symlink_metadata(resolved.join(name)) {
            Ok(metadata) => format_entry(name, &metadata),
            Err(error) => format!("????????? ??? ???????? ??? ?? ??:?? {name} [error: {error}]"),
        })
        .collect();
    Ok(entries.join("\n"))
}

fn format_entry(name: &str, metadata: &fs::Metadata) -> String {
    let modified = metadata
        .modified()
        .ok()
        .map(OffsetDateTime::from)
        .and_then(|time| {
            time.format(format_description!("[month repr:short] [day] [hour]:[minute]"))
                .ok()
        })
        .unwrap_or_else(|| "??? ?? ??:??".to_string());

    format!(
        "{} {:3} {:8} {modified} {name}",
        permission_string(metadata),
        link_count(metadata),
        metadata.len()
    )
}

#[cfg(unix)]
fn permission_string(metadata: &fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;

    let file_type = metadata.file_type();
    let kind = if file_type.is_dir() {
        'd'
    } else if file_type.is_symlink() {
        'l'
    } else if file_type.is_file() {
        '-'
    } else {
        '?'
    };

    let mode = metadata.permissions().mode();
    let mut text = String::with_capacity(10);
    text.push(kind);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        text.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        text.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        text.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    text
}

#[cfg(not(unix))]
fn permission_string(metadata: &fs::Metadata) -> String {
    let kind = if metadata.is_dir() { 'd' } else { '-' };
    let write = if metadata.permissions().readonly() { '-' } else { 'w' };
    format!("{kind}r{write}-r{write}-r{write}-")
}

#[cfg(unix)]
fn link_count(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink()
}

#[cfg(not(unix))]
fn link_count(_metadata: &fs::Metadata) -> u64 {
    1
}

/// Regex search emitting `path:line:text`; hidden directories are skipped.
pub fn search_context(workspace: &Workspace, args: &SearchArgs) -> Result<String, ToolError> {
    let regex = Regex::new(&args.pattern)
        .map_err(|error| ToolError::invalid_arguments(SEARCH_CONTEXT, error.to_string()))?;
    let root = workspace.resolve_existing(&args.path)?;

    let mut results = Vec::new();
    let mut truncated = false;
    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    'files: for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(bytes) = fs::read(entry.path()) else {
            continue;
        };
        if bytes.contains(&0) {
            continue;
        }

        let text = String::from_utf8_lossy(&bytes);
        let display = workspace.display(entry.path());
        for (index, line) in text.lines().enumerate() {
            if regex.is_match(line) {
                if results.len() == SEARCH_MAX_RESULTS {
                    truncated = true;
                    break 'files;
                }
                results.push(format!("{display}:{}:{line}", index + 1));
            }
        }
    }

    debug!(pattern = %args.pattern, matches = results.len(), "search finished");
    if results.is_empty() {
        return Ok(NO_MATCHES.to_string());
    }
    if truncated {
        results.push(format!("[truncated after {SEARCH_MAX_RESULTS} matches]"));
    }
    Ok(results.join("\n"))
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
}

/// Creates a new file through a temporary file and rename; refuses to overwrite.
pub fn create_file(workspace: &Workspace, args: &CreateFileArgs) -> Result<String, ToolError> {
    let resolved = workspace.resolve_new(&args.path)?;
    if fs::symlink_metadata(&resolved).is_ok() {
        return Err(ToolError::AlreadyExists { path: resolved });
    }

    if let Some(parent) = resolved.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| ToolError::io("creating parent directories of", &resolved, source))?;
    }

    write_atomic_new(&resolved, args.content.as_bytes()).map_err(|error| match error {
        PatchError::AlreadyExists { path } => ToolError::AlreadyExists { path },
        other => ToolError::Patch(other),
    })?;
    info!(path = %resolved.display(), bytes = args.content.len(), "file created");
    Ok(format!(
        "Created {} ({} bytes)",
        workspace.display(&resolved),
        args.content.len()
    ))
}

/// Applies anchor-located hunks; see [`patch_editor::patch_file`].
pub fn edit_file(workspace: &Workspace, args: &EditFileArgs) -> Result<String, ToolError> {
    let resolved = workspace.resolve_existing(&args.path)?;
    let outcome = patch_file(&resolved, &args.request)?;
    let display = workspace.display(&resolved);

    let headline = if outcome.written {
        format!(
            "Edited {display}: {} hunk(s), {}",
            outcome.hunks_applied,
            outcome.diff.stat_line()
        )
    } else {
        format!(
            "Dry run for {display}: {} hunk(s) resolved, {}; nothing written",
            outcome.hunks_applied,
            outcome.diff.stat_line()
        )
    };

    Ok(format!(
        "{headline}\nhash: {}\n{}",
        outcome.new_hash, outcome.diff.unified
    ))
}

pub fn file_hash(workspace: &Workspace, args: &PathArgs) -> Result<String, ToolError> {
    let resolved = workspace.resolve_existing(&args.path)?;
    let bytes = fs::read(&resolved).map_err(|source| ToolError::io("reading", &resolved, source))?;
    Ok(content_hash(&bytes))
}

/// Removes the entry itself; a symlink is unlinked, never followed.
pub fn delete_path(workspace: &Workspace, args: &DeletePathArgs) -> Result<String, ToolError> {
    let resolved = workspace.resolve_entry(&args.path)?;
    if resolved == workspace.root() {
        return Err(ToolError::invalid_path(
            &args.path,
            "refusing to delete the workspace root",
        ));
    }

    let metadata = fs::symlink_metadata(&resolved)
        .map_err(|source| ToolError::io("inspecting", &resolved, source))?;
    let removal = if metadata.file_type().is_dir() {
        if args.recursive {
            fs::remove_dir_all(&resolved)
        } else {
            fs::remove_dir(&resolved)
        }
    } else {
        fs::remove_file(&resolved)
    };
    removal.map_err(|source| ToolError::io("deleting", &resolved, source))?;

    info!(path = %resolved.display(), recursive = args.recursive, "path deleted");
    Ok(format!("Deleted {}", workspace.display(&resolved)))
}

pub fn make_directory(workspace: &Workspace, args: &PathArgs) -> Result<String, ToolError> {
    let resolved = workspace.resolve_new(&args.path)?;
    fs::create_dir_all(&resolved)
        .map_err(|source| ToolError::io("creating directory", &resolved, source))?;
    Ok(format!("Created directory {}", workspace.display(&resolved)))
}
