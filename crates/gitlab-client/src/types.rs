//! GitLab-facing data shapes, adapted from `mr-reviewer/src/git_providers/gitlab.rs`'s
//! response structs but renamed to spec.md §3/§4.4 vocabulary
//! (`MrDiffAnchors`, `MrFileChange`).

use chrono::{DateTime, Utc};
use controller_core::diff::{MrDiffAnchors, MrFileChange};
use serde::{Deserialize, Serialize};

/// `GetMRDetails` result (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct MrDetails {
    pub title: String,
    pub description: Option<String>,
    pub anchors: MrDiffAnchors,
    pub changes: Vec<MrFileChange>,
}

/// One entry of `ListOpenMRs` (spec.md §4.1 poller: "lists open MRs updated
/// since the watermark").
#[derive(Debug, Clone)]
pub struct MrSummary {
    pub iid: u64,
    pub source_branch: String,
    pub target_branch: String,
    pub head_sha: String,
    pub updated_at: DateTime<Utc>,
}

/// One entry of `ListMRNotes` (spec.md §4.9: command-prefix notes, filtered
/// by author identity upstream in the poller).
#[derive(Debug, Clone)]
pub struct MrNote {
    pub id: u64,
    pub body: String,
    pub author_username: String,
    pub created_at: DateTime<Utc>,
}

/// The `position` quadruple GitLab's inline-discussion endpoint requires
/// (spec.md §4.4, §6).
#[derive(Debug, Clone, Serialize)]
pub struct DiscussionPosition<'a> {
    pub position_type: &'a str,
    pub base_sha: &'a str,
    pub start_sha: &'a str,
    pub head_sha: &'a str,
    pub old_path: &'a str,
    pub new_path: &'a str,
    pub new_line: u32,
}

impl<'a> DiscussionPosition<'a> {
    pub fn text(anchors: &'a MrDiffAnchors, old_path: &'a str, new_path: &'a str, new_line: u32) -> Self {
        Self {
            position_type: "text",
            base_sha: &anchors.base_sha,
            start_sha: &anchors.start_sha,
            head_sha: &anchors.head_sha,
            old_path,
            new_path,
            new_line,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitLabMr {
    pub title: String,
    pub description: Option<String>,
    pub diff_refs: GitLabDiffRefs,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitLabProject {
    pub http_url_to_repo: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitLabDiffRefs {
    pub base_sha: String,
    pub head_sha: String,
    pub start_sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitLabMrSummary {
    pub iid: u64,
    pub source_branch: String,
    pub target_branch: String,
    pub sha: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitLabNote {
    pub id: u64,
    pub body: String,
    pub author: GitLabUser,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitLabUser {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitLabMrDiffFile {
    pub old_path: String,
    pub new_path: String,
    #[serde(default)]
    pub diff: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitLabDiscussionResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitLabNoteResponse {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitLabMergeRequestResponse {
    pub iid: u64,
}
