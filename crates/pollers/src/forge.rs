//! GitLab merge-request poller (spec.md §4.1, §4.9): lists open MRs since the
//! watermark, runs the review pipeline on each, then lists command notes on
//! that MR and runs the coding pipeline on unseen ones.
//!
//! Grounded on `other_examples/.../breakpoint-github-src-poller.rs`'s
//! loop → per-repo fetch → emit → sleep shape, adapted from its run-state-diff
//! model (`active_runs: HashMap`) to watermark-cursor + dedup-store semantics.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use controller_core::diff::Cursor;
use controller_core::event::{MrCommandPayload, MrReviewPayload};
use controller_core::{ControllerResult, Event, RepoRef};
use controller_gitlab_client::GitlabClient;
use controller_pipelines::{run_coding_pipeline, run_review_pipeline, CodingTask, PipelineContext, ReviewTask, NOTE_DEDUP_TTL};
use tracing::{debug, warn};

use crate::backoff::backoff_delay;
use crate::status::PollerStatus;

/// Runs the GitLab poller loop until the process exits (spec.md §4.1:
/// "a cooperative background task per source, started only when
/// configuration enables it").
#[allow(clippy::too_many_arguments)]
pub async fn run_forge_poller(
    ctx: Arc<PipelineContext>,
    gitlab: GitlabClient,
    projects: Vec<u64>,
    command_prefix: String,
    agent_identity: String,
    interval: Duration,
    lookback: Duration,
    status: Arc<PollerStatus>,
) {
    let mut cursor = Cursor(Utc::now() - chrono::Duration::from_std(lookback).unwrap_or_default());
    loop {
        let poll_start = Utc::now();
        let outcome = run_cycle(&ctx, &gitlab, &projects, &command_prefix, &agent_identity, cursor.0).await;
        let sleep_for = match outcome {
            Ok(()) => {
                cursor.advance_to(poll_start);
                status.record_success(cursor.0);
                interval
            }
            Err(e) => {
                let failures = status.record_failure();
                warn!(error = %e, failures, "forge poller cycle failed");
                backoff_delay(interval, failures)
            }
        };
        tokio::time::sleep(sleep_for).await;
    }
}

async fn run_cycle(
    ctx: &PipelineContext,
    gitlab: &GitlabClient,
    projects: &[u64],
    command_prefix: &str,
    agent_identity: &str,
    since: DateTime<Utc>,
) -> ControllerResult<()> {
    for &project_id in projects {
        if let Err(e) = poll_project(ctx, gitlab, project_id, command_prefix, agent_identity, since).await {
            warn!(project_id, error = %e, "forge poller: project cycle failed");
            return Err(e);
        }
    }
    Ok(())
}

async fn poll_project(
    ctx: &PipelineContext,
    gitlab: &GitlabClient,
    project_id: u64,
    command_prefix: &str,
    agent_identity: &str,
    since: DateTime<Utc>,
) -> ControllerResult<()> {
    let project = project_id.to_string();
    let repo = RepoRef::parse(&gitlab.project_clone_url(&project).await?, false)?;

    for mr in gitlab.list_open_mrs(&project, since).await? {
        let details = gitlab.get_mr_details(&project, mr.iid).await?;
        let review_event = Event::MrReview {
            project_id,
            repo: repo.clone(),
            target_ref: mr.target_branch.clone(),
            head_sha: mr.head_sha.clone(),
            payload: MrReviewPayload {
                iid: mr.iid,
                title: details.title.clone(),
                description: details.description.clone(),
                source_branch: mr.source_branch.clone(),
                target_branch: mr.target_branch.clone(),
            },
        };

        if !ctx.store.is_seen(&review_event.dedup_key()).await? {
            let task = ReviewTask::try_from(&review_event).expect("constructed from an MrReview event");
            debug!(project_id, iid = mr.iid, "poller: dispatching review pipeline");
            if let Err(e) = run_review_pipeline(ctx, task).await {
                warn!(project_id, iid = mr.iid, error = %e, "poller: review pipeline failed");
            }
        }

        for note in gitlab.list_mr_notes(&project, mr.iid, since).await? {
            if note.author_username == agent_identity || !note.body.starts_with(command_prefix) {
                continue;
            }
            let note_event = Event::MrCopilotCommand {
                project_id,
                repo: repo.clone(),
                target_ref: mr.target_branch.clone(),
                head_sha: Some(mr.head_sha.clone()),
                author_identity: Some(note.author_username.clone()),
                payload: MrCommandPayload {
                    iid: mr.iid,
                    note_id: note.id,
                    note_body: note.body.clone(),
                    source_branch: mr.source_branch.clone(),
                },
            };
            let dedup_key = note_event.dedup_key();
            if ctx.store.is_seen(&dedup_key).await? {
                continue;
            }
            let coding_task = CodingTask::from_event(&note_event, command_prefix)?;
            debug!(project_id, iid = mr.iid, note_id = note.id, "poller: dispatching coding pipeline");
            match run_coding_pipeline(ctx, coding_task).await {
                Ok(_) => ctx.store.mark_seen(&dedup_key, NOTE_DEDUP_TTL).await?,
                Err(e) => warn!(project_id, iid = mr.iid, note_id = note.id, error = %e, "poller: coding pipeline failed"),
            }
        }
    }
    Ok(())
}
