//! GitLab REST v4 client, adapted from `mr-reviewer/src/git_providers/gitlab.rs`
//! (fetch side) and `mr-reviewer/src/publish/gitlab.rs` (publish side).
//!
//! Endpoints used:
//! - GET  /projects/:id/merge_requests/:iid
//! - GET  /projects/:id/merge_requests/:iid/diffs
//! - GET  /projects/:id/merge_requests?updated_after=...
//! - GET  /projects/:id/merge_requests/:iid/notes?created_after=...
//! - POST /projects/:id/merge_requests/:iid/discussions
//! - POST /projects/:id/merge_requests/:iid/notes
//! - POST /projects/:id/merge_requests

use chrono::{DateTime, Utc};
use controller_core::diff::{Hunk, MrDiffAnchors, MrFileChange};
use controller_core::{ControllerError, ControllerResult};
use controller_review::{looks_like_binary_patch, parse_unified_diff_advanced};
use reqwest::Client;

use crate::types::{
    DiscussionPosition, GitLabDiscussionResponse, GitLabMergeRequestResponse, GitLabMr, GitLabMrDiffFile,
    GitLabMrSummary, GitLabNote, GitLabNoteResponse, GitLabProject, MrDetails, MrNote, MrSummary,
};

/// Thin wrapper over GitLab's REST v4 API, strict-parsed (unknown fields are
/// ignored by `serde`, never coerced) per spec.md §4.4.
#[derive(Debug, Clone)]
pub struct GitlabClient {
    http: Client,
    base_api: String,
    token: String,
}

impl GitlabClient {
    pub fn new(http: Client, base_api: String, token: String) -> Self {
        Self {
            http,
            base_api: base_api.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn project_path(&self, project: &str) -> String {
        format!("{}/projects/{}", self.base_api, urlencoding::encode(project))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> ControllerResult<T> {
        let resp = req
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ControllerError::ExternalUnavailable(format!(
                "gitlab request failed: status={status} body={body}"
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ControllerError::ResultInvalid(format!("gitlab response did not parse: {e}")))
    }

    /// `GetMRDetails(project, iid) → {title, description, anchors, changes[]}`
    /// (spec.md §4.4). The diffs endpoint is preferred over the deprecated
    /// `/changes` endpoint, same as the teacher.
    pub async fn get_mr_details(&self, project: &str, iid: u64) -> ControllerResult<MrDetails> {
        let meta_url = format!("{}/merge_requests/{iid}", self.project_path(project));
        let meta: GitLabMr = self.send_json(self.http.get(meta_url)).await?;

        let diffs_url = format!("{}/merge_requests/{iid}/diffs", self.project_path(project));
        let files: Vec<GitLabMrDiffFile> = self.send_json(self.http.get(diffs_url)).await?;

        let changes = files
            .into_iter()
            .map(|f| {
                let hunks: Vec<Hunk> = match &f.diff {
                    Some(d) if !looks_like_binary_patch(d) => parse_unified_diff_advanced(d),
                    _ => Vec::new(),
                };
                MrFileChange {
                    old_path: f.old_path,
                    new_path: f.new_path,
                    hunks,
                }
            })
            .collect();

        Ok(MrDetails {
            title: meta.title,
            description: meta.description,
            anchors: MrDiffAnchors {
                base_sha: meta.diff_refs.base_sha,
                start_sha: meta.diff_refs.start_sha,
                head_sha: meta.diff_refs.head_sha,
            },
            changes,
        })
    }

    /// Fetches a single MR's branch/head summary, for callers (the webhook
    /// note handler) that only have a project id and iid and need the
    /// branch names the minimal webhook payload doesn't carry.
    pub async fn get_mr_summary(&self, project: &str, iid: u64) -> ControllerResult<MrSummary> {
        let url = format!("{}/merge_requests/{iid}", self.project_path(project));
        let raw: GitLabMrSummary = self.send_json(self.http.get(url)).await?;
        Ok(MrSummary {
            iid: raw.iid,
            source_branch: raw.source_branch,
            target_branch: raw.target_branch,
            head_sha: raw.sha,
            updated_at: raw.updated_at,
        })
    }

    /// Resolves a numeric/path project identifier to its canonical HTTPS
    /// clone URL, for the poller (which only has a configured project id or
    /// path, unlike the webhook path which receives the clone URL directly
    /// in the event payload).
    pub async fn project_clone_url(&self, project: &str) -> ControllerResult<String> {
        let url = self.project_path(project);
        let resp: GitLabProject = self.send_json(self.http.get(url)).await?;
        Ok(resp.http_url_to_repo)
    }

    /// `ListOpenMRs(project, updated_after)` (spec.md §4.1 poller).
    pub async fn list_open_mrs(&self, project: &str, updated_after: DateTime<Utc>) -> ControllerResult<Vec<MrSummary>> {
        let url = format!(
            "{}/merge_requests?state=opened&updated_after={}&per_page=100",
            self.project_path(project),
            urlencoding::encode(&updated_after.to_rfc3339())
        );
        let raw: Vec<GitLabMrSummary> = self.send_json(self.http.get(url)).await?;
        Ok(raw
            .into_iter()
            .map(|m| MrSummary {
                iid: m.iid,
                source_branch: m.source_branch,
                target_branch: m.target_branch,
                head_sha: m.sha,
                updated_at: m.updated_at,
            })
            .collect())
    }

    /// `ListMRNotes(project, iid, created_after)` (spec.md §4.9).
    pub async fn list_mr_notes(&self, project: &str, iid: u64, created_after: DateTime<Utc>) -> ControllerResult<Vec<MrNote>> {
        let url = format!(
            "{}/merge_requests/{iid}/notes?created_after={}&per_page=100",
            self.project_path(project),
            urlencoding::encode(&created_after.to_rfc3339())
        );
        let raw: Vec<GitLabNote> = self.send_json(self.http.get(url)).await?;
        Ok(raw
            .into_iter()
            .map(|n| MrNote {
                id: n.id,
                body: n.body,
                author_username: n.author.username,
                created_at: n.created_at,
            })
            .collect())
    }

    /// `CreateDiscussion(project, iid, position, body)` (spec.md §4.4, §6).
    pub async fn create_discussion(&self, project: &str, iid: u64, position: &DiscussionPosition<'_>, body: &str) -> ControllerResult<String> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            body: &'a str,
            position: &'a DiscussionPosition<'a>,
        }
        let url = format!("{}/merge_requests/{iid}/discussions", self.project_path(project));
        let resp: GitLabDiscussionResponse = self
            .send_json(self.http.post(url).json(&Req { body, position }))
            .await?;
        Ok(resp.id)
    }

    /// `CreateNote(project, iid, body)` (spec.md §4.4).
    pub async fn create_note(&self, project: &str, iid: u64, body: &str) -> ControllerResult<u64> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            body: &'a str,
        }
        let url = format!("{}/merge_requests/{iid}/notes", self.project_path(project));
        let resp: GitLabNoteResponse = self.send_json(self.http.post(url).json(&Req { body })).await?;
        Ok(resp.id)
    }

    /// `CreateMergeRequest(project, source, target, title, description) → iid`
    /// (spec.md §4.4, §4.8 step 6).
    pub async fn create_merge_request(&self, project: &str, source: &str, target: &str, title: &str, description: &str) -> ControllerResult<u64> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            source_branch: &'a str,
            target_branch: &'a str,
            title: &'a str,
            description: &'a str,
        }
        let url = format!("{}/merge_requests", self.project_path(project));
        let resp: GitLabMergeRequestResponse = self
            .send_json(self.http.post(url).json(&Req {
                source_branch: source,
                target_branch: target,
                title,
                description,
            }))
            .await?;
        Ok(resp.iid)
    }

    /// Lists existing discussions on the MR, for the idempotency-marker scan
    /// in `publish` (spec.md's posted-comment dedup is not itself named, but
    /// grounded on `mr-reviewer/src/publish/gitlab.rs`'s `load_existing_markers`).
    pub(crate) async fn list_discussion_bodies(&self, project: &str, iid: u64) -> ControllerResult<Vec<String>> {
        #[derive(serde::Deserialize)]
        struct Note {
            body: Option<String>,
        }
        #[derive(serde::Deserialize)]
        struct Discussion {
            notes: Vec<Note>,
        }
        let url = format!("{}/merge_requests/{iid}/discussions?per_page=100", self.project_path(project));
        let discussions: Vec<Discussion> = self.send_json(self.http.get(url)).await?;
        Ok(discussions
            .into_iter()
            .flat_map(|d| d.notes.into_iter())
            .filter_map(|n| n.body)
            .collect())
    }
}
