//! Jira Cloud REST response shapes, built in the same "typed `reqwest`
//! wrapper, strict-parsed, unknown fields ignored" idiom as
//! `controller-gitlab-client` (spec.md §4.4).

use serde::Deserialize;

/// One issue returned by `SearchByStatus` (spec.md §3 `jira_coding` payload
/// source).
#[derive(Debug, Clone)]
pub struct JiraIssue {
    pub key: String,
    pub summary: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JiraSearchResponse {
    pub issues: Vec<JiraSearchIssue>,
    pub total: u64,
    #[serde(rename = "startAt")]
    pub start_at: u64,
    #[serde(rename = "maxResults")]
    pub max_results: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JiraSearchIssue {
    pub key: String,
    pub fields: JiraSearchFields,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JiraSearchFields {
    pub summary: String,
    #[serde(default)]
    pub description: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JiraTransitionsResponse {
    pub transitions: Vec<JiraTransition>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JiraTransition {
    pub id: String,
    pub name: String,
}

/// Extracts plain text from a Jira Cloud Atlassian Document Format
/// description (paragraph-of-text nodes only; richer formatting is not
/// needed by this system).
pub(crate) fn adf_to_plain_text(value: &serde_json::Value) -> Option<String> {
    fn walk(node: &serde_json::Value, out: &mut String) {
        if let Some(text) = node.get("text").and_then(|t| t.as_str()) {
            out.push_str(text);
        }
        if let Some(children) = node.get("content").and_then(|c| c.as_array()) {
            for child in children {
                walk(child, out);
            }
            out.push('\n');
        }
    }
    let mut out = String::new();
    walk(value, &mut out);
    let trimmed = out.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Wraps plain text as a minimal ADF document for `AddComment` (spec.md
/// §4.4: "formats as the tracker's document format").
pub(crate) fn plain_text_to_adf(text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "doc",
        "version": 1,
        "content": [{
            "type": "paragraph",
            "content": [{ "type": "text", "text": text }],
        }],
    })
}
