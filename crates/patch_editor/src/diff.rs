use similar::{ChangeTag, TextDiff};

/// Line-level summary of a content change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSummary {
    pub lines_added: usize,
    pub lines_removed: usize,
    /// Unified diff with three lines of context.
    pub unified: String,
}

impl DiffSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines_added == 0 && self.lines_removed == 0
    }

    /// `+N -M` style one-liner.
    #[must_use]
    pub fn stat_line(&self) -> String {
        format!("+{} -{}", self.lines_added, self.lines_removed)
    }
}

#[must_use]
pub fn diff_summary(label: &str, old: &str, new: &str) -> DiffSummary {
    let diff = TextDiff::from_lines(old, new);

    let mut lines_added = 0usize;
    let mut lines_removed = 0usize;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => lines_added += 1,
            ChangeTag::Delete => lines_removed += 1,
            ChangeTag::Equal => {}
        }
    }

    let unified = diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string();

    DiffSummary {
        lines_added,
        lines_removed,
        unified,
    }
}
