//! Typed Jira Cloud client: issue search, status transitions, and comments.
//!
//! New relative to the teacher (which has no Jira client), built in the same
//! idiom as `controller-gitlab-client` — see DESIGN.md.

mod client;
mod types;

pub use client::JiraClient;
pub use types::JiraIssue;

#[cfg(test)]
mod tests {
    use crate::types::{adf_to_plain_text, plain_text_to_adf};

    #[test]
    fn adf_round_trips_plain_text() {
        let doc = plain_text_to_adf("hello world");
        let text = adf_to_plain_text(&doc).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn adf_to_plain_text_none_for_empty_doc() {
        let doc = serde_json::json!({ "type": "doc", "version": 1, "content": [] });
        assert!(adf_to_plain_text(&doc).is_none());
    }
}
