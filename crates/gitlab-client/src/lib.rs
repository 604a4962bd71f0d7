//! Typed GitLab REST v4 client: MR metadata/diffs fetch, and idempotent
//! discussion/note publishing.
//!
//! Grounded on `mr-reviewer/src/git_providers/gitlab.rs` (fetch) and
//! `mr-reviewer/src/publish/gitlab.rs` (publish) — see DESIGN.md.

mod client;
mod publish;
mod types;

pub use client::GitlabClient;
pub use publish::{post_review_comments, post_summary_paragraph};
pub use types::{DiscussionPosition, MrDetails, MrNote, MrSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use controller_core::diff::{Comment, MrDiffAnchors, Severity};

    #[test]
    fn discussion_position_carries_anchors_verbatim() {
        let anchors = MrDiffAnchors {
            base_sha: "base".into(),
            start_sha: "start".into(),
            head_sha: "head".into(),
        };
        let position = DiscussionPosition::text(&anchors, "a.py", "a.py", 3);
        assert_eq!(position.position_type, "text");
        assert_eq!(position.base_sha, "base");
        assert_eq!(position.new_line, 3);
    }

    #[test]
    fn comment_constructs_without_panicking() {
        let comment = Comment {
            file_path: "a.py".into(),
            line: 3,
            severity: Severity::Info,
            body: "note".into(),
            replacement: None,
        };
        assert_eq!(comment.file_path, "a.py");
    }
}
