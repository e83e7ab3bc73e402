use std::ops::Range;

use regex::Regex;

use crate::error::PatchError;
use crate::hunk::{Anchor, AnchorKind, EditOperation, Hunk, Occurrence};

/// A hunk located in the original content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHunk {
    /// 1-based position of the hunk in the request.
    pub hunk: usize,
    /// Byte range of the original content being replaced. Empty for insertions.
    pub range: Range<usize>,
    pub replacement: String,
}

/// Locates every hunk against `original` and rejects overlapping ranges.
///
/// The result is sorted by start offset; insertions sort before a replacement that
/// starts at the same offset.
pub fn resolve_hunks(original: &str, hunks: &[Hunk]) -> Result<Vec<ResolvedHunk>, PatchError> {
    if hunks.is_empty() {
        return Err(PatchError::EmptyPatch);
    }

    let mut resolved = Vec::with_capacity(hunks.len());
    for (index, hunk) in hunks.iter().enumerate() {
        resolved.push(resolve_hunk(original, index + 1, hunk)?);
    }

    for (position, left) in resolved.iter().enumerate() {
        for right in &resolved[position + 1..] {
            if ranges_overlap(&left.range, &right.range) {
                return Err(PatchError::OverlappingHunks {
                    first: left.hunk,
                    second: right.hunk,
                });
            }
        }
    }

    resolved.sort_by_key(|hunk| (hunk.range.start, hunk.range.end, hunk.hunk));
    Ok(resolved)
}

/// Applies `hunks` to `original` as one snapshot and returns the new content.
pub fn apply_hunks(original: &str, hunks: &[Hunk]) -> Result<String, PatchError> {
    let resolved = resolve_hunks(original, hunks)?;
    Ok(splice(original, &resolved))
}

pub(crate) fn splice(original: &str, resolved: &[ResolvedHunk]) -> String {
    let mut output = String::with_capacity(original.len());
    let mut cursor = 0usize;

    for hunk in resolved {
        output.push_str(&original[cursor..hunk.range.start]);
        output.push_str(&hunk.replacement);
        cursor = hunk.range.end;
    }

    output.push_str(&original[cursor..]);
    output
}

fn resolve_hunk(original: &str, hunk_number: usize, hunk: &Hunk) -> Result<ResolvedHunk, PatchError> {
    let selection = hunk.anchor.selection(hunk_number)?;
    let matches = find_matches(original, &hunk.anchor, hunk_number)?;
    let matched = select_match(&matches, selection, hunk_number, &hunk.anchor)?;

    let content = || {
        hunk.content.clone().ok_or(PatchError::MissingContent {
            hunk: hunk_number,
            operation: hunk.operation,
        })
    };

    let (range, replacement) = match hunk.operation {
        EditOperation::Replace => (matched, content()?),
        EditOperation::Delete => (matched, String::new()),
        EditOperation::InsertBefore => (matched.start..matched.start, content()?),
        EditOperation::InsertAfter => (matched.end..matched.end, content()?),
    };

    Ok(ResolvedHunk {
        hunk: hunk_number,
        range,
        replacement,
    })
}

fn find_matches(
    original: &str,
    anchor: &Anchor,
    hunk_number: usize,
) -> Result<Vec<Range<usize>>, PatchError> {
    if anchor.pattern.is_empty() {
        return Err(PatchError::invalid_anchor(hunk_number, "pattern must not be empty"));
    }

    match anchor.kind {
        AnchorKind::Exact => Ok(original
            .match_indices(anchor.pattern.as_str())
            .map(|(start, matched)| start..start + matched.len())
            .collect()),
        AnchorKind::Regex => {
            let regex = Regex::new(&anchor.pattern)
                .map_err(|error| PatchError::invalid_anchor(hunk_number, error.to_string()))?;
            Ok(regex.find_iter(original).map(|found| found.range()).collect())
        }
    }
}

fn select_match(
    matches: &[Range<usize>],
    selection: Occurrence,
    hunk_number: usize,
    anchor: &Anchor,
) -> Result<Range<usize>, PatchError> {
    let not_found = || PatchError::AnchorNotFound {
        hunk: hunk_number,
        pattern: anchor.pattern.clone(),
        found: matches.len(),
    };

    let selected = match selection {
        Occurrence::Unique => {
            if matches.len() > 1 {
                return Err(PatchError::AmbiguousAnchor {
                    hunk: hunk_number,
                    pattern: anchor.pattern.clone(),
                    matches: matches.len(),
                });
            }
            matches.first()
        }
        Occurrence::First => matches.first(),
        Occurrence::Last => matches.last(),
        Occurrence::Nth(n) => matches.get(n - 1),
    };

    selected.cloned().ok_or_else(not_found)
}

/// Two ranges conflict when they share a byte, when two insertions target the same
/// offset, or when an insertion falls strictly inside a replaced range.
fn ranges_overlap(left: &Range<usize>, right: &Range<usize>) -> bool {
    match (left.is_empty(), right.is_empty()) {
        (false, false) => left.start < right.end && right.start < left.end,
        (true, true) => left.start == right.start,
        (true, false) => right.start < left.start && left.start < right.end,
        (false, true) => left.start < right.start && right.start < left.end,
    }
}
