//! Parses the agent's structured coding output: a trailing fenced ```json
//! block naming the files it touched plus a summary (spec.md §4.6 step 5,
//! "parse the agent's structured output (list of files touched +
//! summary)"). Mirrors `controller-review`'s fail-soft philosophy: a missing
//! or malformed block degrades to a fallback rather than failing the task.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CodingOutputBlock {
    files_touched: Vec<String>,
    summary: String,
}

pub struct CodingOutput {
    pub files_touched: Vec<String>,
    pub summary: String,
}

/// Extracts the last fenced ```json block in `text` and parses it as a
/// `{files_touched, summary}` object. Returns `None` if no such block is
/// present or it doesn't parse — the caller falls back to a working-tree
/// status scan (see `controller_git_workspace::changed_paths`).
pub fn parse_coding_output(text: &str) -> Option<CodingOutput> {
    let mut search_from = 0;
    let mut last_match = None;
    while let Some(start) = text[search_from..].find("```json") {
        let abs_start = search_from + start + "```json".len();
        let Some(end_rel) = text[abs_start..].find("```") else {
            break;
        };
        last_match = Some(text[abs_start..abs_start + end_rel].trim().to_string());
        search_from = abs_start + end_rel + 3;
    }

    let block = last_match?;
    let parsed: CodingOutputBlock = serde_json::from_str(&block).ok()?;
    Some(CodingOutput { files_touched: parsed.files_touched, summary: parsed.summary })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_block() {
        let text = "I fixed the bug.\n\n```json\n{\"files_touched\": [\"src/lib.rs\"], \"summary\": \"fixed the bug\"}\n```\n";
        let out = parse_coding_output(text).unwrap();
        assert_eq!(out.files_touched, vec!["src/lib.rs".to_string()]);
        assert_eq!(out.summary, "fixed the bug");
    }

    #[test]
    fn uses_last_block_when_multiple_present() {
        let text = "```json\n{\"files_touched\": [\"a\"], \"summary\": \"first\"}\n```\nmore text\n```json\n{\"files_touched\": [\"b\"], \"summary\": \"second\"}\n```\n";
        let out = parse_coding_output(text).unwrap();
        assert_eq!(out.files_touched, vec!["b".to_string()]);
    }

    #[test]
    fn returns_none_when_absent() {
        assert!(parse_coding_output("just prose, no structure").is_none());
    }

    #[test]
    fn returns_none_on_malformed_json() {
        let text = "```json\n{not valid json\n```\n";
        assert!(parse_coding_output(text).is_none());
    }
}
