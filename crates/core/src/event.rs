//! The normalized internal event shape (spec.md §3 "Event").
//!
//! Both webhook ingestion and poller discovery converge on this type before
//! a pipeline ever runs. Strict at the boundary (webhooks deny unknown
//! fields via the extractor in `controller-api`); this type itself carries
//! no parsing opinions, only the normalized shape.

use serde::{Deserialize, Serialize};

use crate::repo::RepoRef;

/// Discriminated event kind, replacing the source's dynamic dict payload
/// (REDESIGN FLAGS: "ad-hoc dict payloads at boundaries become tagged sum
/// types").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    MrReview {
        project_id: u64,
        repo: RepoRef,
        target_ref: String,
        head_sha: String,
        payload: MrReviewPayload,
    },
    MrCopilotCommand {
        project_id: u64,
        repo: RepoRef,
        target_ref: String,
        head_sha: Option<String>,
        author_identity: Option<String>,
        payload: MrCommandPayload,
    },
    JiraCoding {
        project_id: u64,
        repo: RepoRef,
        target_ref: String,
        payload: JiraCodingPayload,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrReviewPayload {
    pub iid: u64,
    pub title: String,
    pub description: Option<String>,
    pub source_branch: String,
    pub target_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrCommandPayload {
    pub iid: u64,
    pub note_id: u64,
    pub note_body: String,
    pub source_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraCodingPayload {
    pub issue_key: String,
    pub summary: String,
    pub description: Option<String>,
}

impl Event {
    /// `RepoRef` this event mutates or reads — the lock key for any
    /// mutating pipeline invocation.
    pub fn repo(&self) -> &RepoRef {
        match self {
            Event::MrReview { repo, .. } => repo,
            Event::MrCopilotCommand { repo, .. } => repo,
            Event::JiraCoding { repo, .. } => repo,
        }
    }

    pub fn project_id(&self) -> u64 {
        match self {
            Event::MrReview { project_id, .. } => *project_id,
            Event::MrCopilotCommand { project_id, .. } => *project_id,
            Event::JiraCoding { project_id, .. } => *project_id,
        }
    }

    /// Dedup key for this event, per the formats named in spec.md §3.
    pub fn dedup_key(&self) -> String {
        match self {
            Event::MrReview {
                project_id,
                head_sha,
                payload,
                ..
            } => format!("review:{project_id}:{}:{head_sha}", payload.iid),
            Event::MrCopilotCommand {
                project_id, payload, ..
            } => format!("note:{project_id}:{}:{}", payload.iid, payload.note_id),
            Event::JiraCoding { payload, .. } => format!("jira:{}", payload.issue_key),
        }
    }
}
