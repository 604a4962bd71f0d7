//! Extraction of `ParsedReview` from an agent's freeform `summary_text`,
//! adapted from the fail-soft philosophy in `mr-reviewer/src/review/policy.rs`:
//! drop invalid comments, never fail the whole review. Where the teacher
//! parses an ANCHOR/SEVERITY/TITLE/BODY block format with regexes, this
//! parses a fenced JSON array followed by a trailing summary paragraph
//! (spec.md §4.7 step 5).

use controller_core::diff::{Comment, ParsedReview, Replacement, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
struct RawComment {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    suggestion_start_offset: u32,
    #[serde(default)]
    suggestion_end_offset: u32,
}

fn severity_from_str(s: &str) -> Severity {
    match s.to_ascii_lowercase().as_str() {
        "error" => Severity::Error,
        "info" => Severity::Info,
        _ => Severity::Warning,
    }
}

fn severity_as_str(s: Severity) -> &'static str {
    match s {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "info",
    }
}

/// Finds the agent's JSON array: a fenced ```json block if present,
/// otherwise the first top-level `[...]` in the text. Returns the array
/// slice and the byte offset immediately after it (where the summary
/// paragraph begins).
fn locate_json_array(text: &str) -> Option<(&str, usize)> {
    if let Some(fence_start) = text.find("```json") {
        let body_start = fence_start + "```json".len();
        if let Some(fence_end_rel) = text[body_start..].find("```") {
            let body = text[body_start..body_start + fence_end_rel].trim();
            let after = body_start + fence_end_rel + "```".len();
            return Some((body, after));
        }
    }
    if let Some(fence_start) = text.find("```") {
        let body_start = fence_start + "```".len();
        if let Some(fence_end_rel) = text[body_start..].find("```") {
            let body = text[body_start..body_start + fence_end_rel].trim();
            if body.starts_with('[') {
                let after = body_start + fence_end_rel + "```".len();
                return Some((body, after));
            }
        }
    }

    let start = text.find('[')?;
    let mut depth = 0i32;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + i + 1;
                    return Some((&text[start..end], end));
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses `summary_text` into a `ParsedReview`, never failing: unparsable
/// or malformed comments are dropped, and if no JSON array is found at all
/// the whole text becomes the summary paragraph (spec.md §4.7 step 5).
pub fn parse_review(summary_text: &str) -> ParsedReview {
    let Some((array_src, after)) = locate_json_array(summary_text) else {
        return ParsedReview {
            comments: Vec::new(),
            summary_paragraph: summary_text.trim().to_string(),
        };
    };

    // Parsed as loose JSON values, not `Vec<RawComment>` directly: a single
    // comment missing a required field must not sink the whole array (spec.md
    // §4.7 step 5 — drop only that comment, keep the rest).
    let values: Vec<serde_json::Value> = match serde_json::from_str(array_src) {
        Ok(items) => items,
        Err(err) => {
            tracing::debug!(error = %err, "review output array failed to parse, falling back to plain summary");
            return ParsedReview {
                comments: Vec::new(),
                summary_paragraph: summary_text.trim().to_string(),
            };
        }
    };

    let comments = values
        .into_iter()
        .filter_map(|value| {
            let item: RawComment = serde_json::from_value(value).ok()?;
            let file = item.file?;
            let line = item.line?;
            let body = item.comment?;
            if body.trim().is_empty() {
                return None;
            }
            let replacement = item.suggestion.map(|text| Replacement {
                text,
                lines_above: item.suggestion_start_offset,
                lines_below: item.suggestion_end_offset,
            });
            Some(Comment {
                file_path: file,
                line,
                severity: item.severity.as_deref().map(severity_from_str).unwrap_or(Severity::Warning),
                body,
                replacement,
            })
        })
        .collect();

    ParsedReview {
        comments,
        summary_paragraph: summary_text[after..].trim().to_string(),
    }
}

/// Inverse of [`parse_review`]: renders a fenced JSON array followed by the
/// summary paragraph, used by the poster and by round-trip tests
/// (spec.md §8: `Parse(Render(ParsedReview)) == ParsedReview`).
pub fn render_review(review: &ParsedReview) -> String {
    let raw: Vec<RawComment> = review
        .comments
        .iter()
        .map(|c| RawComment {
            file: Some(c.file_path.clone()),
            line: Some(c.line),
            severity: Some(severity_as_str(c.severity).to_string()),
            comment: Some(c.body.clone()),
            suggestion: c.replacement.as_ref().map(|r| r.text.clone()),
            suggestion_start_offset: c.replacement.as_ref().map(|r| r.lines_above).unwrap_or(0),
            suggestion_end_offset: c.replacement.as_ref().map(|r| r.lines_below).unwrap_or(0),
        })
        .collect();

    let array = serde_json::to_string(&raw).unwrap_or_else(|_| "[]".to_string());
    format!("```json\n{array}\n```\n{}", review.summary_paragraph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json_array_and_trailing_summary() {
        let text = "```json\n[{\"file\":\"a.py\",\"line\":3,\"severity\":\"warning\",\"comment\":\"Use a constant.\",\"suggestion\":\"FOO = 1\",\"suggestion_start_offset\":0,\"suggestion_end_offset\":0}]\n```\nLooks fine overall.";
        let review = parse_review(text);
        assert_eq!(review.comments.len(), 1);
        assert_eq!(review.comments[0].file_path, "a.py");
        assert_eq!(review.comments[0].line, 3);
        assert_eq!(review.comments[0].severity, Severity::Warning);
        assert_eq!(review.comments[0].replacement.as_ref().unwrap().text, "FOO = 1");
        assert_eq!(review.summary_paragraph, "Looks fine overall.");
    }

    #[test]
    fn drops_comments_missing_required_fields() {
        let text = "```json\n[{\"file\":\"a.py\",\"line\":3},{\"file\":\"b.py\",\"line\":4,\"comment\":\"ok\"}]\n```\nSummary.";
        let review = parse_review(text);
        assert_eq!(review.comments.len(), 1);
        assert_eq!(review.comments[0].file_path, "b.py");
    }

    #[test]
    fn drops_comments_missing_file_or_line_but_keeps_the_rest() {
        let text = "```json\n[{\"line\":3,\"comment\":\"no file here\"},{\"file\":\"b.py\",\"comment\":\"no line here\"},{\"file\":\"c.py\",\"line\":5,\"comment\":\"kept\"}]\n```\nSummary.";
        let review = parse_review(text);
        assert_eq!(review.comments.len(), 1);
        assert_eq!(review.comments[0].file_path, "c.py");
        assert_eq!(review.comments[0].line, 5);
    }

    #[test]
    fn unparsable_output_falls_back_to_whole_text_as_summary() {
        let text = "I could not produce structured output this time.";
        let review = parse_review(text);
        assert!(review.comments.is_empty());
        assert_eq!(review.summary_paragraph, text);
    }

    #[test]
    fn malformed_json_array_falls_back_gracefully() {
        let text = "```json\n[{\"file\": \n```\nStill some notes here.";
        let review = parse_review(text);
        assert!(review.comments.is_empty());
        assert_eq!(review.summary_paragraph, text);
    }

    #[test]
    fn render_then_parse_round_trips() {
        let review = ParsedReview {
            comments: vec![Comment {
                file_path: "a.py".into(),
                line: 3,
                severity: Severity::Error,
                body: "Off by one.".into(),
                replacement: Some(Replacement {
                    text: "fixed".into(),
                    lines_above: 1,
                    lines_below: 1,
                }),
            }],
            summary_paragraph: "Overall looks okay.".into(),
        };
        let rendered = render_review(&review);
        let reparsed = parse_review(&rendered);
        assert_eq!(reparsed, review);
    }

    #[test]
    fn first_top_level_array_used_when_no_fence_present() {
        let text = "Here is my review: [{\"file\":\"x.rs\",\"line\":1,\"comment\":\"nit\"}] thanks";
        let review = parse_review(text);
        assert_eq!(review.comments.len(), 1);
        assert_eq!(review.summary_paragraph, "thanks");
    }
}
