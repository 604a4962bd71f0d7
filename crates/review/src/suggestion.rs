//! Suggestion-block rendering/parsing and full discussion-body assembly
//! (spec.md §6 "Suggestion block syntax", §8 invariant on `above+below <=
//! 200`). Adapted from `mr-reviewer/src/review/policy.rs`'s severity-prefix
//! convention (`[WARNING]` etc.), generalized to the spec's fenced
//! `suggestion:-{above}+{below}` block instead of the teacher's own
//! ANCHOR/TITLE format.

use controller_core::diff::{Comment, Replacement, Severity};
use regex::Regex;
use std::sync::OnceLock;

fn suggestion_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```suggestion:-(\d+)\+(\d+)\n(.*?)\n?```").unwrap())
}

fn severity_tag(s: Severity) -> &'static str {
    match s {
        Severity::Error => "[ERROR]",
        Severity::Warning => "[WARNING]",
        Severity::Info => "[INFO]",
    }
}

/// Renders `suggestion:-{above}+{below}` fenced block content.
pub fn render_suggestion_block(replacement: &Replacement) -> String {
    format!(
        "```suggestion:-{}+{}\n{}\n```",
        replacement.lines_above, replacement.lines_below, replacement.text
    )
}

/// Extracts the first suggestion block in `body`, if any.
pub fn parse_suggestion_block(body: &str) -> Option<Replacement> {
    let caps = suggestion_fence_re().captures(body)?;
    let lines_above: u32 = caps.get(1)?.as_str().parse().ok()?;
    let lines_below: u32 = caps.get(2)?.as_str().parse().ok()?;
    let text = caps.get(3)?.as_str().to_string();
    Some(Replacement { text, lines_above, lines_below })
}

/// Renders a full discussion body for `comment`: severity tag, the comment
/// text, and (when present and within the `<= 200` span limit) a suggestion
/// block. A suggestion that exceeds the span limit is dropped silently, but
/// the comment itself is always kept (spec.md §8 boundary behavior).
pub fn render_discussion_body(comment: &Comment) -> String {
    let mut out = format!("{}\n{}", severity_tag(comment.severity), comment.body);
    if let Some(replacement) = &comment.replacement {
        if replacement.is_within_span() {
            out.push_str("\n\n");
            out.push_str(&render_suggestion_block(replacement));
        } else {
            tracing::debug!(
                file = %comment.file_path,
                line = comment.line,
                lines_above = replacement.lines_above,
                lines_below = replacement.lines_below,
                "suggestion span exceeds 200 lines, dropping block but keeping comment"
            );
        }
    }
    out
}

/// Renders a fallback summary-note body for a comment whose position is not
/// valid in the current diff (spec.md §4.7 step 7, §8 invariant 5):
/// `file:line — body`.
pub fn render_summary_note(comment: &Comment) -> String {
    format!("{}:{} — {}", comment.file_path, comment.line, comment.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(replacement: Option<Replacement>) -> Comment {
        Comment {
            file_path: "a.py".into(),
            line: 3,
            severity: Severity::Warning,
            body: "Use a constant.".into(),
            replacement,
        }
    }

    #[test]
    fn renders_and_parses_suggestion_block_round_trip() {
        let replacement = Replacement { text: "FOO = 1".into(), lines_above: 0, lines_below: 0 };
        let rendered = render_suggestion_block(&replacement);
        assert_eq!(rendered, "```suggestion:-0+0\nFOO = 1\n```");
        let parsed = parse_suggestion_block(&rendered).unwrap();
        assert_eq!(parsed, replacement);
    }

    #[test]
    fn discussion_body_contains_severity_tag_and_suggestion() {
        let replacement = Replacement { text: "FOO = 1".into(), lines_above: 0, lines_below: 0 };
        let body = render_discussion_body(&comment(Some(replacement)));
        assert!(body.contains("[WARNING]"));
        assert!(body.contains("Use a constant."));
        assert!(body.contains("```suggestion:-0+0\nFOO = 1\n```"));
    }

    #[test]
    fn oversized_suggestion_span_dropped_but_comment_kept() {
        let replacement = Replacement { text: "x".into(), lines_above: 150, lines_below: 51 };
        let body = render_discussion_body(&comment(Some(replacement)));
        assert!(!body.contains("suggestion:-"));
        assert!(body.contains("Use a constant."));
    }

    #[test]
    fn summary_note_format_is_file_colon_line_dash() {
        let note = render_summary_note(&comment(None));
        assert_eq!(note, "a.py:3 — Use a constant.");
    }
}
