//! `POST /webhook` (spec.md §4.1, §6): verify the shared-secret signature,
//! parse strictly, normalize into an `Event`, apply the project allowlist,
//! and hand the pipeline off to a background task. The request path itself
//! never blocks on a pipeline.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use controller_core::event::{MrCommandPayload, MrReviewPayload};
use controller_core::{ControllerResult, Event, RepoRef};
use controller_pipelines::{run_coding_pipeline, run_review_pipeline, CodingTask, ReviewTask, NOTE_DEDUP_TTL};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::webhook::payload::{MrAction, WebhookPayload};
use crate::webhook::signature::{self, SIGNATURE_HEADER};

#[derive(Serialize)]
struct WebhookResponse {
    status: &'static str,
}

fn queued() -> Response {
    (StatusCode::OK, Json(WebhookResponse { status: "queued" })).into_response()
}

fn ignored() -> Response {
    (StatusCode::OK, Json(WebhookResponse { status: "ignored" })).into_response()
}

pub async fn webhook_handler(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> AppResult<Response> {
    let signature_header = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !signature::verify(&state.config.webhook_secret, signature_header, &body) {
        return Err(AppError::Unauthorized);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let project_id = match &payload {
        WebhookPayload::MergeRequest { project_id, .. } => *project_id,
        WebhookPayload::Note { project_id, .. } => *project_id,
    };
    if !state.config.project_allowlist.is_empty() && !state.config.project_allowlist.contains(&project_id) {
        debug!(project_id, "webhook: project not in allowlist, ignoring");
        return Ok(ignored());
    }

    match payload {
        WebhookPayload::MergeRequest { action, oldrev, .. } if action == MrAction::Update && oldrev.is_none() => {
            debug!(project_id, "webhook: metadata-only update, ignoring");
            Ok(ignored())
        }
        WebhookPayload::MergeRequest {
            iid, source, target, last_commit_sha, title, description, ..
        } => {
            let state = state.clone();
            let task = spawn_review(state, project_id, iid, source, target, last_commit_sha, title, description);
            tokio::spawn(task);
            Ok(queued())
        }
        WebhookPayload::Note { noteable_type, .. } if noteable_type != "MergeRequest" => {
            debug!(project_id, "webhook: note on a non-MR noteable, ignoring");
            Ok(ignored())
        }
        WebhookPayload::Note {
            iid, note_id, body: note_body, author_username, ..
        } => {
            if author_username.eq_ignore_ascii_case(&state.config.agent_identity) {
                debug!(project_id, iid, "webhook: note authored by agent identity, loop break");
                return Ok(ignored());
            }
            if !note_body.starts_with(state.config.command_prefix.as_str()) {
                debug!(project_id, iid, "webhook: note missing command prefix, ignoring");
                return Ok(ignored());
            }

            let state = state.clone();
            let command_prefix = state.config.command_prefix.clone();
            let task = spawn_coding_from_note(state, project_id, iid, note_id, note_body, author_username, command_prefix);
            tokio::spawn(task);
            Ok(queued())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn spawn_review(
    state: Arc<AppState>,
    project_id: u64,
    iid: u64,
    source: String,
    target: String,
    head_sha: String,
    title: String,
    description: Option<String>,
) {
    if let Err(e) = run_review_from_webhook(&state, project_id, iid, source, target, head_sha, title, description).await {
        warn!(project_id, iid, error = %e, "webhook: review pipeline failed");
        metrics::counter!("webhook_errors_total", "handler" => "merge_request").increment(1);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_review_from_webhook(
    state: &AppState,
    project_id: u64,
    iid: u64,
    source: String,
    target: String,
    head_sha: String,
    title: String,
    description: Option<String>,
) -> ControllerResult<()> {
    let repo = resolve_repo(state, project_id).await?;
    let event = Event::MrReview {
        project_id,
        repo,
        target_ref: target.clone(),
        head_sha,
        payload: MrReviewPayload { iid, title, description, source_branch: source, target_branch: target },
    };
    let task = ReviewTask::try_from(&event).expect("constructed from an MrReview event");
    info!(project_id, iid, "webhook: dispatching review pipeline");
    run_review_pipeline(&state.ctx, task).await?;
    Ok(())
}

async fn spawn_coding_from_note(state: Arc<AppState>, project_id: u64, iid: u64, note_id: u64, note_body: String, author_username: String, command_prefix: String) {
    if let Err(e) = run_coding_from_note(&state, project_id, iid, note_id, note_body, author_username, &command_prefix).await {
        warn!(project_id, iid, error = %e, "webhook: coding pipeline failed");
        metrics::counter!("webhook_errors_total", "handler" => "note").increment(1);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_coding_from_note(
    state: &AppState,
    project_id: u64,
    iid: u64,
    note_id: u64,
    note_body: String,
    author_username: String,
    command_prefix: &str,
) -> ControllerResult<()> {
    let repo = resolve_repo(state, project_id).await?;
    let summary = state.ctx.gitlab.get_mr_summary(&project_id.to_string(), iid).await?;
    let event = Event::MrCopilotCommand {
        project_id,
        repo,
        target_ref: summary.target_branch.clone(),
        head_sha: Some(summary.head_sha),
        author_identity: Some(author_username),
        payload: MrCommandPayload { iid, note_id, note_body, source_branch: summary.source_branch },
    };

    let dedup_key = event.dedup_key();
    if state.ctx.store.is_seen(&dedup_key).await? {
        debug!(project_id, iid, note_id, "webhook: note already handled, skipping");
        return Ok(());
    }

    let task = CodingTask::from_event(&event, command_prefix)?;
    info!(project_id, iid, note_id, "webhook: dispatching coding pipeline");
    run_coding_pipeline(&state.ctx, task).await?;
    state.ctx.store.mark_seen(&dedup_key, NOTE_DEDUP_TTL).await?;
    Ok(())
}

/// The minimal webhook DTO carries no clone URL (spec.md §4.1's own example
/// payload doesn't name one), so it is resolved the same way the forge
/// poller resolves it: a `GET /projects/:id` lookup.
async fn resolve_repo(state: &AppState, project_id: u64) -> ControllerResult<RepoRef> {
    let url = state.ctx.gitlab.project_clone_url(&project_id.to_string()).await?;
    RepoRef::parse(&url, state.ctx.allow_http_clone)
}
