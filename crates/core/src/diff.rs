//! Diff anchoring and parsed-review shapes shared between `controller-review`
//! and `controller-gitlab-client` (spec.md §3 `MRDiffAnchors`,
//! `MRFileChange`, `ParsedReview`).

use serde::{Deserialize, Serialize};

/// SHAs a forge requires to anchor an inline discussion to a specific diff
/// version (spec.md §3 `MRDiffAnchors`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrDiffAnchors {
    pub base_sha: String,
    pub start_sha: String,
    pub head_sha: String,
}

/// A single unified-diff hunk header plus the new-side line numbers it
/// introduces, used to compute the set of (file, line) positions a forge
/// will accept an inline discussion on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    /// New-side line numbers introduced or retained by this hunk (context
    /// and added lines; excludes pure deletions, which have no new-side
    /// anchor).
    pub valid_new_lines: Vec<u32>,
}

/// One changed file in an MR's diff, with its hunks (spec.md §3
/// `MRFileChange`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrFileChange {
    pub old_path: String,
    pub new_path: String,
    pub hunks: Vec<Hunk>,
}

impl MrFileChange {
    /// True if `line` on the new side of this file falls within a hunk's
    /// valid-anchor set (spec.md §8 invariant 5).
    pub fn is_valid_position(&self, line: u32) -> bool {
        self.hunks.iter().any(|h| h.valid_new_lines.contains(&line))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// An inline-discussion replacement suggestion (spec.md §3, §6 "suggestion
/// block syntax"). `lines_above + lines_below <= 200`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub text: String,
    #[serde(default)]
    pub lines_above: u32,
    #[serde(default)]
    pub lines_below: u32,
}

impl Replacement {
    pub const MAX_SPAN: u32 = 200;

    pub fn is_within_span(&self) -> bool {
        self.lines_above + self.lines_below <= Self::MAX_SPAN
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub file_path: String,
    pub line: u32,
    pub severity: Severity,
    pub body: String,
    #[serde(default)]
    pub replacement: Option<Replacement>,
}

/// The parsed, structured form of a `ReviewResult.summary_text` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReview {
    pub comments: Vec<Comment>,
    pub summary_paragraph: String,
}

/// Per-poller watermark (spec.md §3 `Cursor`). Initialized to "now" at
/// startup and advanced to `poll_start` after each cycle — never to the
/// cycle's end time, so work created mid-cycle remains visible next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor(pub chrono::DateTime<chrono::Utc>);

impl Cursor {
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    pub fn advance_to(&mut self, poll_start: chrono::DateTime<chrono::Utc>) {
        self.0 = poll_start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hunk(new_start: u32, new_lines: u32) -> Hunk {
        Hunk {
            old_start: new_start,
            old_lines: new_lines,
            new_start,
            new_lines,
            valid_new_lines: (new_start..new_start + new_lines).collect(),
        }
    }

    #[test]
    fn valid_position_true_inside_hunk_range() {
        let change = MrFileChange {
            old_path: "a.rs".into(),
            new_path: "a.rs".into(),
            hunks: vec![hunk(10, 5)],
        };
        assert!(change.is_valid_position(12));
        assert!(!change.is_valid_position(20));
    }

    #[test]
    fn replacement_span_limit() {
        let r = Replacement {
            text: "x".into(),
            lines_above: 150,
            lines_below: 51,
        };
        assert!(!r.is_within_span());
        let r2 = Replacement {
            text: "x".into(),
            lines_above: 100,
            lines_below: 100,
        };
        assert!(r2.is_within_span());
    }

    #[test]
    fn cursor_advances_to_poll_start_not_now() {
        let mut c = Cursor(chrono::Utc::now() - chrono::Duration::hours(1));
        let poll_start = chrono::Utc::now() - chrono::Duration::minutes(5);
        c.advance_to(poll_start);
        assert_eq!(c.0, poll_start);
    }
}
