use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOperation {
    Replace,
    InsertBefore,
    InsertAfter,
    Delete,
}

impl fmt::Display for EditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Replace => "replace",
            Self::InsertBefore => "insert_before",
            Self::InsertAfter => "insert_after",
            Self::Delete => "delete",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    /// Literal substring.
    #[default]
    Exact,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceKind {
    First,
    Last,
    Nth,
}

/// Occurrence selection after validation of the wire fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    /// No selector given: the anchor must match exactly once.
    Unique,
    First,
    Last,
    /// 1-based index into the match list.
    Nth(usize),
}

/// Pattern locating the point in the original content where a hunk applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    #[serde(default)]
    pub kind: AnchorKind,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<OccurrenceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<usize>,
}

impl Anchor {
    #[must_use]
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            kind: AnchorKind::Exact,
            pattern: pattern.into(),
            occurrence: None,
            n: None,
        }
    }

    #[must_use]
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            kind: AnchorKind::Regex,
            ..Self::exact(pattern)
        }
    }

    #[must_use]
    pub fn first(mut self) -> Self {
        self.occurrence = Some(OccurrenceKind::First);
        self.n = None;
        self
    }

    #[must_use]
    pub fn last(mut self) -> Self {
        self.occurrence = Some(OccurrenceKind::Last);
        self.n = None;
        self
    }

    #[must_use]
    pub fn nth(mut self, n: usize) -> Self {
        self.occurrence = Some(OccurrenceKind::Nth);
        self.n = Some(n);
        self
    }

    /// Validates the `occurrence` / `n` pair. A bare `n` implies `nth`.
    pub fn selection(&self, hunk: usize) -> Result<Occurrence, PatchError> {
        match (self.occurrence, self.n) {
            (None, None) => Ok(Occurrence::Unique),
            (Some(OccurrenceKind::First), _) => Ok(Occurrence::First),
            (Some(OccurrenceKind::Last), _) => Ok(Occurrence::Last),
            (Some(OccurrenceKind::Nth) | None, Some(0)) => Err(PatchError::invalid_anchor(
                hunk,
                "n is 1-based and must be at least 1",
            )),
            (Some(OccurrenceKind::Nth) | None, Some(n)) => Ok(Occurrence::Nth(n)),
            (Some(OccurrenceKind::Nth), None) => Err(PatchError::invalid_anchor(
                hunk,
                "occurrence \"nth\" requires n",
            )),
        }
    }
}

/// One localized edit. `content` is ignored for `delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub operation: EditOperation,
    pub anchor: Anchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Hunk {
    #[must_use]
    pub fn replace(anchor: Anchor, content: impl Into<String>) -> Self {
        Self {
            operation: EditOperation::Replace,
            anchor,
            content: Some(content.into()),
        }
    }

    #[must_use]
    pub fn insert_before(anchor: Anchor, content: impl Into<String>) -> Self {
        Self {
            operation: EditOperation::InsertBefore,
            anchor,
            content: Some(content.into()),
        }
    }

    #[must_use]
    pub fn insert_after(anchor: Anchor, content: impl Into<String>) -> Self {
        Self {
            operation: EditOperation::InsertAfter,
            anchor,
            content: Some(content.into()),
        }
    }

    #[must_use]
    pub fn delete(anchor: Anchor) -> Self {
        Self {
            operation: EditOperation::Delete,
            anchor,
            content: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_n_selects_nth() {
        let anchor = Anchor {
            n: Some(2),
            ..Anchor::exact("x")
        };
        assert_eq!(anchor.selection(1).expect("valid"), Occurrence::Nth(2));
    }

    #[test]
    fn nth_without_n_is_rejected() {
        let anchor = Anchor {
            occurrence: Some(OccurrenceKind::Nth),
            ..Anchor::exact("x")
        };
        assert!(matches!(
            anchor.selection(3),
            Err(PatchError::InvalidAnchor { hunk: 3, .. })
        ));
    }

    #[test]
    fn zero_n_is_rejected() {
        assert!(Anchor::exact("x").nth(0).selection(1).is_err());
    }
}
