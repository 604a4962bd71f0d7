//! Coding pipeline (spec.md §4.8): lock → clone (+ branch for Jira) →
//! execute → apply → commit → push → (Jira: open MR + transition) → cleanup.
//!
//! Replay safety: a `CodingResult` is only ever applied if
//! `base_commit_sha == HeadSha(clone)`, so a retry against a moved base
//! fails loudly instead of silently producing a merge conflict.

use std::time::Instant;

use controller_core::{ControllerError, ControllerResult, Event, RepoRef, TaskKind, TaskParams, TaskResult};
use tracing::debug;

use crate::prompt::{coding_system_prompt, coding_user_prompt_for_command, coding_user_prompt_for_issue};
use crate::{PipelineContext, LOCK_TTL};

/// Normalized input to the coding pipeline (spec.md §4.8 step 2's two
/// distinct clone strategies).
#[derive(Debug, Clone)]
pub enum CodingTask {
    MrCommand {
        project_id: u64,
        repo: RepoRef,
        iid: u64,
        source_branch: String,
        note_body: String,
        command_prefix: String,
    },
    JiraIssue {
        repo: RepoRef,
        issue_key: String,
        summary: String,
        description: Option<String>,
        target_branch: String,
    },
}

impl CodingTask {
    /// Builds a `CodingTask` from a normalized `Event`. `target_branch` is
    /// only needed for `JiraCoding` (the repo's configured default branch,
    /// since `target_ref` on a Jira event names it directly); `command_prefix`
    /// is only needed for `MrCopilotCommand`, to strip it back off for the prompt.
    pub fn from_event(event: &Event, command_prefix: &str) -> ControllerResult<Self> {
        match event {
            Event::MrCopilotCommand {
                project_id, repo, payload, ..
            } => Ok(CodingTask::MrCommand {
                project_id: *project_id,
                repo: repo.clone(),
                iid: payload.iid,
                source_branch: payload.source_branch.clone(),
                note_body: payload.note_body.clone(),
                command_prefix: command_prefix.to_string(),
            }),
            Event::JiraCoding { repo, target_ref, payload, .. } => Ok(CodingTask::JiraIssue {
                repo: repo.clone(),
                issue_key: payload.issue_key.clone(),
                summary: payload.summary.clone(),
                description: payload.description.clone(),
                target_branch: target_ref.clone(),
            }),
            other => Err(ControllerError::Validation(format!("not a coding event: {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingOutcome {
    Success,
    NoChanges,
}

impl CodingOutcome {
    fn metric_label(self) -> &'static str {
        match self {
            CodingOutcome::Success => "success",
            CodingOutcome::NoChanges => "no_changes",
        }
    }
}

/// Runs the coding pipeline for one `CodingTask` to completion (spec.md
/// §4.8 steps 1-8).
pub async fn run_coding_pipeline(ctx: &PipelineContext, task: CodingTask) -> ControllerResult<CodingOutcome> {
    let t0 = Instant::now();
    let result = run_coding_pipeline_inner(ctx, &task).await;
    let outcome_label = match &result {
        Ok(outcome) => outcome.metric_label(),
        Err(_) => "error",
    };
    metrics::counter!("coding_tasks_total", "outcome" => outcome_label).increment(1);
    metrics::histogram!("coding_tasks_duration", "outcome" => outcome_label).record(t0.elapsed().as_secs_f64());
    result
}

async fn run_coding_pipeline_inner(ctx: &PipelineContext, task: &CodingTask) -> ControllerResult<CodingOutcome> {
    let repo = match task {
        CodingTask::MrCommand { repo, .. } => repo,
        CodingTask::JiraIssue { repo, .. } => repo,
    };

    // Step 1: the repo lock is mandatory — coding always mutates refs.
    debug!(repo = %repo.lock_key(), "acquiring repo lock for coding task");
    let lock = ctx.store.acquire_lock(repo.lock_key(), LOCK_TTL).await?;

    let result = run_after_lock(ctx, task).await;
    lock.release().await?;
    result
}

async fn run_after_lock(ctx: &PipelineContext, task: &CodingTask) -> ControllerResult<CodingOutcome> {
    // Step 2: clone strategy differs by task kind.
    let (repo, clone_branch) = match task {
        CodingTask::MrCommand { repo, source_branch, .. } => (repo, source_branch.clone()),
        CodingTask::JiraIssue { repo, target_branch, .. } => (repo, target_branch.clone()),
    };

    debug!(branch = %clone_branch, "cloning for coding task");
    let clone_path = controller_git_workspace::clone(repo, &clone_branch, &ctx.forge_token, &ctx.clone_dir, ctx.clone_timeout).await?;

    let outcome = run_after_clone(ctx, task, &clone_path).await;
    let _ = tokio::fs::remove_dir_all(&clone_path).await;
    outcome
}

async fn run_after_clone(ctx: &PipelineContext, task: &CodingTask, clone_path: &std::path::Path) -> ControllerResult<CodingOutcome> {
    let working_branch = match task {
        CodingTask::MrCommand { source_branch, .. } => source_branch.clone(),
        CodingTask::JiraIssue { issue_key, .. } => {
            let branch = controller_git_workspace::checkout_new_unique_branch(clone_path, &format!("agent/{issue_key}")).await?;
            debug!(branch = %branch, "checked out unique branch for jira issue");
            branch
        }
    };

    // Step 3: invoke the executor with a coding-kind TaskParams.
    let repo = match task {
        CodingTask::MrCommand { repo, .. } => repo,
        CodingTask::JiraIssue { repo, .. } => repo,
    };
    let kind = match task {
        CodingTask::MrCommand { .. } => TaskKind::MrCopilotCommand,
        CodingTask::JiraIssue { .. } => TaskKind::JiraCoding,
    };
    let task_id = derive_task_id(task, clone_path).await?;
    let (system_prompt, user_prompt) = coding_prompt(task);

    let params = TaskParams {
        task_id,
        kind,
        repo_clone_url: repo.as_str().to_string(),
        branch: working_branch.clone(),
        system_prompt,
        user_prompt,
        timeout: ctx.task_timeout,
        working_directory: Some(clone_path.display().to_string()),
    };

    debug!("step3: invoking executor for coding task");
    let result = ctx.executor.execute(&params).await?;

    // Step 4: apply the result.
    match result {
        TaskResult::EmptyCoding { .. } => {
            debug!("executor reported no changes needed");
            report_outcome(ctx, task, CodingOutcome::NoChanges, None).await?;
            return Ok(CodingOutcome::NoChanges);
        }
        TaskResult::Coding { patch_bytes, base_commit_sha, .. } if !patch_bytes.is_empty() => {
            let current_head = controller_git_workspace::head_sha(clone_path).await?;
            if base_commit_sha != current_head {
                return Err(ControllerError::ResultInvalid(format!(
                    "coding result base_commit_sha {base_commit_sha} does not match current HEAD {current_head}; repo moved under us"
                )));
            }
            controller_git_workspace::apply_patch(clone_path, patch_bytes).await?;
        }
        // Empty patch_bytes without the EmptyCoding tag, or InProcessExecutor's
        // always-empty patch: changes are already on disk (or there are none);
        // CommitAllStaged below decides whether there is anything to commit.
        TaskResult::Coding { .. } => {}
        TaskResult::Review { .. } => {
            return Err(ControllerError::ResultInvalid("coding task executor returned a review result".into()));
        }
    }

    // Step 5: stage and commit.
    controller_git_workspace::stage_all(clone_path).await?;
    let committed = controller_git_workspace::commit_all_staged(
        clone_path,
        &commit_message(task),
        &ctx.agent_identity,
        &format!("{}@agents.local", ctx.agent_identity.replace(' ', "-").to_lowercase()),
    )
    .await?;

    if !committed {
        debug!("nothing to commit after applying result");
        report_outcome(ctx, task, CodingOutcome::NoChanges, None).await?;
        return Ok(CodingOutcome::NoChanges);
    }

    // Step 6: push, and for Jira flows open the MR / transition the issue.
    controller_git_workspace::push(clone_path, "origin", &working_branch, &ctx.forge_token).await?;

    let mr_iid = match task {
        CodingTask::JiraIssue { repo, issue_key, summary, target_branch, .. } => {
            let project = project_path_from_repo(repo);
            let iid = ctx
                .gitlab
                .create_merge_request(&project, &working_branch, target_branch, &format!("{issue_key}: {summary}"), &format!("Automated change for {issue_key}."))
                .await?;
            Some(iid)
        }
        CodingTask::MrCommand { .. } => None,
    };

    report_outcome(ctx, task, CodingOutcome::Success, mr_iid).await?;
    Ok(CodingOutcome::Success)
}

fn commit_message(task: &CodingTask) -> String {
    match task {
        CodingTask::MrCommand { iid, .. } => format!("Apply requested change (MR !{iid})"),
        CodingTask::JiraIssue { issue_key, summary, .. } => format!("{issue_key}: {summary}"),
    }
}

fn coding_prompt(task: &CodingTask) -> (String, String) {
    let system = coding_system_prompt();
    let user = match task {
        CodingTask::MrCommand { note_body, command_prefix, .. } => coding_user_prompt_for_command(note_body, command_prefix),
        CodingTask::JiraIssue { summary, description, .. } => coding_user_prompt_for_issue(summary, description.as_deref()),
    };
    (system, user)
}

async fn derive_task_id(task: &CodingTask, clone_path: &std::path::Path) -> ControllerResult<String> {
    let head_sha = controller_git_workspace::head_sha(clone_path).await?;
    Ok(match task {
        CodingTask::MrCommand { project_id, iid, .. } => {
            TaskParams::derive_task_id(TaskKind::MrCopilotCommand, &project_id.to_string(), &iid.to_string(), &head_sha)
        }
        CodingTask::JiraIssue { issue_key, .. } => TaskParams::derive_task_id(TaskKind::JiraCoding, issue_key, issue_key, &head_sha),
    })
}

/// Jira-sourced tasks carry only the repo's clone URL, not a forge project
/// id, so `create_merge_request`'s `project` argument is built from the
/// clone URL's path segment (`group/project`), which GitLab's API accepts
/// in place of a numeric id.
fn project_path_from_repo(repo: &RepoRef) -> String {
    let url = repo.as_str();
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    let path = url[after_scheme..].split_once('/').map(|(_, p)| p).unwrap_or("");
    path.trim_end_matches(".git").to_string()
}

/// Reports the outcome to the originator: a "no changes needed" or
/// success note on the MR, or a Jira comment + status transition (spec.md
/// §4.8 steps 4, 6).
async fn report_outcome(ctx: &PipelineContext, task: &CodingTask, outcome: CodingOutcome, mr_iid: Option<u64>) -> ControllerResult<()> {
    match task {
        CodingTask::MrCommand { project_id, iid, .. } => {
            let body = match outcome {
                CodingOutcome::NoChanges => "No changes needed.".to_string(),
                CodingOutcome::Success => "Applied the requested change and pushed a commit.".to_string(),
            };
            ctx.gitlab.create_note(&project_id.to_string(), *iid, &body).await?;
        }
        CodingTask::JiraIssue { issue_key, .. } => {
            let Some(jira) = &ctx.jira else {
                return Err(ControllerError::ConfigInvalid("jira coding task without a configured tracker client".into()));
            };
            match outcome {
                CodingOutcome::NoChanges => {
                    jira.add_comment(issue_key, "No changes needed.").await?;
                }
                CodingOutcome::Success => {
                    let body = match mr_iid {
                        Some(iid) => format!("Opened merge request !{iid} with the requested change."),
                        None => "Applied the requested change.".to_string(),
                    };
                    jira.add_comment(issue_key, &body).await?;
                    jira.transition_issue(issue_key, &ctx.jira_in_review_status).await?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_metric_labels_are_distinct() {
        assert_ne!(CodingOutcome::Success.metric_label(), CodingOutcome::NoChanges.metric_label());
    }
}
