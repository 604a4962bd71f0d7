//! Review pipeline (spec.md §4.7): already-reviewed check → lock → clone →
//! execute → parse → post → mark seen → cleanup.

use std::time::Instant;

use controller_core::diff::ParsedReview;
use controller_core::{ControllerError, ControllerResult, Event, RepoRef, TaskKind, TaskParams, TaskResult};
use tracing::debug;

use crate::prompt::{review_system_prompt, review_user_prompt};
use crate::{PipelineContext, REVIEW_DEDUP_TTL, LOCK_TTL};

/// Normalized input to the review pipeline, built by the webhook handler or
/// the forge poller from an `Event::MrReview`.
#[derive(Debug, Clone)]
pub struct ReviewTask {
    pub project_id: u64,
    pub repo: RepoRef,
    pub iid: u64,
    pub head_sha: String,
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Posted,
    AlreadyReviewed,
}

impl TryFrom<&Event> for ReviewTask {
    type Error = ControllerError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        match event {
            Event::MrReview {
                project_id,
                repo,
                head_sha,
                payload,
                ..
            } => Ok(ReviewTask {
                project_id: *project_id,
                repo: repo.clone(),
                iid: payload.iid,
                head_sha: head_sha.clone(),
                source_branch: payload.source_branch.clone(),
                target_branch: payload.target_branch.clone(),
                title: payload.title.clone(),
                description: payload.description.clone(),
            }),
            other => Err(ControllerError::Validation(format!("not a review event: {other:?}"))),
        }
    }
}

impl ReviewOutcome {
    fn metric_label(self) -> &'static str {
        match self {
            ReviewOutcome::Posted => "success",
            ReviewOutcome::AlreadyReviewed => "already_reviewed",
        }
    }
}

/// Runs the review pipeline for one `ReviewTask` to completion (spec.md
/// §4.7 steps 1-10). Never returns an error for agent-content problems
/// (`parse_review` degrades gracefully); errors here are infrastructure
/// failures (lock, clone, executor, forge).
pub async fn run_review_pipeline(ctx: &PipelineContext, task: ReviewTask) -> ControllerResult<ReviewOutcome> {
    let t0 = Instant::now();
    let result = run_review_pipeline_inner(ctx, &task).await;
    let outcome_label = match &result {
        Ok(outcome) => outcome.metric_label(),
        Err(_) => "error",
    };
    metrics::counter!("reviews_total", "outcome" => outcome_label).increment(1);
    metrics::histogram!("reviews_duration", "outcome" => outcome_label).record(t0.elapsed().as_secs_f64());
    result
}

async fn run_review_pipeline_inner(ctx: &PipelineContext, task: &ReviewTask) -> ControllerResult<ReviewOutcome> {
    let dedup_key = format!("review:{}:{}:{}", task.project_id, task.iid, task.head_sha);

    // Step 1: already-reviewed tracker.
    if ctx.store.is_seen(&dedup_key).await? {
        debug!(key = %dedup_key, "review already posted, skipping");
        return Ok(ReviewOutcome::AlreadyReviewed);
    }

    // Step 2: repo lock (read-only work, but prevents thrash on the clone).
    debug!(repo = %task.repo.lock_key(), "acquiring repo lock for review");
    let lock = ctx.store.acquire_lock(task.repo.lock_key(), LOCK_TTL).await?;

    // Step 3: clone at the MR's source branch.
    debug!(branch = %task.source_branch, "cloning for review");
    let clone_path = controller_git_workspace::clone(
        &task.repo,
        &task.source_branch,
        &ctx.forge_token,
        &ctx.clone_dir,
        ctx.clone_timeout,
    )
    .await?;

    let outcome = run_after_clone(ctx, task, &clone_path).await;

    let _ = tokio::fs::remove_dir_all(&clone_path).await;
    lock.release().await?;

    let outcome = outcome?;
    ctx.store.mark_seen(&dedup_key, REVIEW_DEDUP_TTL).await?;
    Ok(outcome)
}

async fn run_after_clone(ctx: &PipelineContext, task: &ReviewTask, clone_path: &std::path::Path) -> ControllerResult<ReviewOutcome> {
    let project = task.project_id.to_string();

    let task_id = TaskParams::derive_task_id(TaskKind::MrReview, &project, &task.iid.to_string(), &task.head_sha);
    let params = TaskParams {
        task_id,
        kind: TaskKind::MrReview,
        repo_clone_url: task.repo.as_str().to_string(),
        branch: task.source_branch.clone(),
        system_prompt: review_system_prompt(),
        user_prompt: review_user_prompt(&task.title, task.description.as_deref(), &task.source_branch, &task.target_branch),
        timeout: ctx.task_timeout,
        working_directory: Some(clone_path.display().to_string()),
    };

    debug!("step4: invoking executor for review");
    let result = ctx.executor.execute(&params).await?;
    let summary_text = match result {
        TaskResult::Review { summary_text } => summary_text,
        other => {
            return Err(controller_core::ControllerError::ResultInvalid(format!(
                "review task returned a non-review result: {other:?}"
            )))
        }
    };

    debug!("step5: parsing review output");
    let parsed: ParsedReview = controller_review::parse_review(&summary_text);

    debug!("step6: fetching MR details for diff anchors");
    let details = ctx.gitlab.get_mr_details(&project, task.iid).await?;

    debug!(comments = parsed.comments.len(), "step7: posting review comments");
    controller_gitlab_client::post_review_comments(&ctx.gitlab, &project, task.iid, &details.anchors, &details.changes, &parsed.comments).await?;

    debug!("step8: posting summary paragraph");
    controller_gitlab_client::post_summary_paragraph(&ctx.gitlab, &project, task.iid, &parsed.summary_paragraph).await?;

    Ok(ReviewOutcome::Posted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_metric_labels_are_distinct() {
        assert_ne!(ReviewOutcome::Posted.metric_label(), ReviewOutcome::AlreadyReviewed.metric_label());
    }
}
