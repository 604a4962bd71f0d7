//! Cross-references `ParsedReview` comments against an MR's hunks to decide,
//! per spec.md §4.7 step 7 / §8 invariant 5, whether each comment becomes an
//! inline discussion or a fallback summary note.

use controller_core::diff::{Comment, MrFileChange};

/// A comment routed to its posting destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedComment<'a> {
    /// `(file, line)` fell inside a hunk's valid-anchor set: post inline.
    Inline(&'a Comment),
    /// Position invalid: becomes a summary note instead (never dropped).
    SummaryFallback(&'a Comment),
}

/// Finds the file change matching `comment.file_path` by `new_path` and
/// checks whether `comment.line` is a valid anchor position on it.
fn is_valid_position(changes: &[MrFileChange], comment: &Comment) -> bool {
    changes
        .iter()
        .find(|c| c.new_path == comment.file_path)
        .is_some_and(|c| c.is_valid_position(comment.line))
}

/// Routes every comment in `comments` to `Inline` or `SummaryFallback`,
/// preserving order. No comment is ever dropped by this step.
pub fn route_comments<'a>(comments: &'a [Comment], changes: &[MrFileChange]) -> Vec<RoutedComment<'a>> {
    comments
        .iter()
        .map(|c| {
            if is_valid_position(changes, c) {
                RoutedComment::Inline(c)
            } else {
                RoutedComment::SummaryFallback(c)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_core::diff::{Hunk, Severity};

    fn change(new_path: &str, new_start: u32, new_lines: u32) -> MrFileChange {
        MrFileChange {
            old_path: new_path.to_string(),
            new_path: new_path.to_string(),
            hunks: vec![Hunk {
                old_start: new_start,
                old_lines: new_lines,
                new_start,
                new_lines,
                valid_new_lines: (new_start..new_start + new_lines).collect(),
            }],
        }
    }

    fn comment(file_path: &str, line: u32) -> Comment {
        Comment {
            file_path: file_path.to_string(),
            line,
            severity: Severity::Info,
            body: "note".into(),
            replacement: None,
        }
    }

    #[test]
    fn valid_position_routes_inline() {
        let changes = vec![change("a.py", 1, 5)];
        let comments = vec![comment("a.py", 3)];
        let routed = route_comments(&comments, &changes);
        assert_eq!(routed, vec![RoutedComment::Inline(&comments[0])]);
    }

    #[test]
    fn unknown_file_routes_to_summary_fallback() {
        let changes = vec![change("a.py", 1, 5)];
        let comments = vec![comment("b.py", 3)];
        let routed = route_comments(&comments, &changes);
        assert_eq!(routed, vec![RoutedComment::SummaryFallback(&comments[0])]);
    }

    #[test]
    fn line_outside_hunk_routes_to_summary_fallback() {
        let changes = vec![change("a.py", 1, 5)];
        let comments = vec![comment("a.py", 99)];
        let routed = route_comments(&comments, &changes);
        assert_eq!(routed, vec![RoutedComment::SummaryFallback(&comments[0])]);
    }
}
