//! Idempotent posting of `ParsedReview` comments, grounded on
//! `mr-reviewer/src/publish/gitlab.rs`'s hidden-marker scheme
//! (`<!-- mrai:key=...;hash=...;ver=1 -->`), renamed to this system's own
//! marker prefix and generalized from the teacher's line/range/symbol/file
//! target kinds to the spec's simpler `(file_path, line)` position model.

use std::collections::HashSet;

use controller_core::diff::{Comment, MrDiffAnchors, MrFileChange};
use controller_core::ControllerResult;
use controller_review::{render_discussion_body, render_summary_note, route_comments, RoutedComment};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::client::GitlabClient;
use crate::types::DiscussionPosition;

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--\s*ctl:key=([^;>]+);hash=([0-9a-f]+);ver=1\s*-->").unwrap())
}

fn comment_hash(comment: &Comment) -> String {
    let mut hasher = Sha256::new();
    hasher.update(comment.file_path.as_bytes());
    hasher.update(comment.line.to_le_bytes());
    hasher.update(comment.body.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn comment_key(comment: &Comment) -> String {
    format!("{}:{}", comment.file_path, comment.line)
}

fn marker(comment: &Comment) -> (String, String) {
    let key = comment_key(comment);
    let hash = comment_hash(comment);
    (format!("{key}#{hash}"), format!("<!-- ctl:key={key};hash={hash};ver=1 -->"))
}

async fn existing_marker_keys(client: &GitlabClient, project: &str, iid: u64) -> ControllerResult<HashSet<String>> {
    let bodies = client.list_discussion_bodies(project, iid).await?;
    let mut set = HashSet::new();
    for body in bodies {
        if let Some(caps) = marker_re().captures(&body) {
            let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let hash = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            set.insert(format!("{key}#{hash}"));
        }
    }
    Ok(set)
}

/// Posts every comment in `comments`, routed inline-vs-summary per
/// `controller_review::route_comments`, skipping any comment whose marker
/// key+hash was already posted in a prior attempt (spec.md §4.7 steps 7-8;
/// idempotency grounded on the teacher's marker scheme). Returns the number
/// of comments actually posted (excludes skipped duplicates).
pub async fn post_review_comments(
    client: &GitlabClient,
    project: &str,
    iid: u64,
    anchors: &MrDiffAnchors,
    changes: &[MrFileChange],
    comments: &[Comment],
) -> ControllerResult<usize> {
    let existing = existing_marker_keys(client, project, iid).await?;
    let routed = route_comments(comments, changes);
    let mut posted = 0usize;

    for entry in routed {
        let comment = match entry {
            RoutedComment::Inline(c) => c,
            RoutedComment::SummaryFallback(c) => c,
        };
        let (full_key, marker_text) = marker(comment);
        if existing.contains(&full_key) {
            tracing::debug!(key = %full_key, "skipping duplicate review comment");
            continue;
        }

        match entry {
            RoutedComment::Inline(_) => {
                let new_path = &comment.file_path;
                let old_path = changes
                    .iter()
                    .find(|c| &c.new_path == new_path)
                    .map(|c| c.old_path.as_str())
                    .unwrap_or(new_path.as_str());
                let position = DiscussionPosition::text(anchors, old_path, new_path, comment.line);
                let body = format!("{}\n\n{marker_text}", render_discussion_body(comment));
                client.create_discussion(project, iid, &position, &body).await?;
            }
            RoutedComment::SummaryFallback(_) => {
                let body = format!("{}\n\n{marker_text}", render_summary_note(comment));
                client.create_note(project, iid, &body).await?;
            }
        }
        posted += 1;
    }

    Ok(posted)
}

/// Posts the review's trailing summary paragraph as a general note
/// (spec.md §4.7 step 8).
pub async fn post_summary_paragraph(client: &GitlabClient, project: &str, iid: u64, summary_paragraph: &str) -> ControllerResult<()> {
    if summary_paragraph.trim().is_empty() {
        return Ok(());
    }
    client.create_note(project, iid, summary_paragraph).await?;
    Ok(())
}
