//! Anchor-located file edits applied against a single snapshot.
//!
//! Each hunk names an anchor (literal or regex) plus an occurrence selector. All
//! anchors are resolved in the original content, overlapping hunks are rejected,
//! and the result is spliced together in one pass. Writes go through a temporary
//! file and an atomic rename, optionally guarded by a content-hash precondition.

mod apply;
mod diff;
mod editor;
mod error;
mod hunk;
mod persist;

pub use apply::{apply_hunks, resolve_hunks, ResolvedHunk};
pub use diff::{diff_summary, DiffSummary};
pub use editor::{patch_file, PatchOutcome, PatchRequest};
pub use error::PatchError;
pub use hunk::{Anchor, AnchorKind, EditOperation, Hunk, Occurrence, OccurrenceKind};
pub use persist::{content_hash, hash_matches, write_atomic, write_atomic_new};
