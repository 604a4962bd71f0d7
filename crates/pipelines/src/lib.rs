//! Review and coding pipelines (spec.md §4.7, §4.8): the numbered-step,
//! single-public-entry-point style `mr-reviewer/src/lib.rs`'s `run_review`
//! uses, generalized from "fetch + RAG + prompt" to "lock + clone + execute +
//! publish".

mod coding_pipeline;
mod prompt;
mod review_pipeline;

use std::path::PathBuf;
use std::time::Duration;

use controller_executor::TaskExecutor;
use controller_gitlab_client::GitlabClient;
use controller_jira_client::JiraClient;
use controller_store::Store;

pub use coding_pipeline::{run_coding_pipeline, CodingOutcome, CodingTask};
pub use review_pipeline::{run_review_pipeline, ReviewOutcome, ReviewTask};

/// Lock lease period (spec.md §3 "TTL is one lease period (default 300s)").
pub const LOCK_TTL: Duration = Duration::from_secs(300);

/// Dedup TTLs (spec.md §3 "Dedup key examples").
pub const REVIEW_DEDUP_TTL: Duration = Duration::from_secs(24 * 3600);
pub const NOTE_DEDUP_TTL: Duration = Duration::from_secs(24 * 3600);
/// `jira:{issue_key}` is "in-memory, session lifetime" per spec.md §3 — no
/// real expiry, so a long TTL stands in for "outlives the process".
pub const JIRA_DEDUP_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Everything a pipeline run needs, assembled once at startup and shared
/// across every invocation (spec.md §5: no shared mutable state beyond the
/// lock/dedup store). Callers hold this behind an `Arc` to share it across
/// concurrently running pollers/webhook handlers.
pub struct PipelineContext {
    pub store: Store,
    pub executor: TaskExecutor,
    pub gitlab: GitlabClient,
    pub jira: Option<JiraClient>,
    pub forge_token: String,
    pub agent_identity: String,
    pub clone_timeout: Duration,
    pub task_timeout: Duration,
    pub clone_dir: PathBuf,
    pub allow_http_clone: bool,
    /// Status name to transition a Jira issue to once it is picked up for
    /// processing (`TrackerConfig.in_progress_status`), before a branch/MR
    /// exists; also the signal the tracker poller relies on to avoid
    /// re-pickup of the same issue after a restart. Unused when `jira` is
    /// `None`.
    pub jira_in_progress_status: String,
    /// Status name to transition a Jira issue to once its MR is open
    /// (`TrackerConfig.in_review_status`); unused when `jira` is `None`.
    pub jira_in_review_status: String,
}
