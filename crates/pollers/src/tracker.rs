//! Jira issue poller (spec.md §4.1, §4.9): lists issues in the configured
//! trigger status across configured projects, runs the coding pipeline for
//! unseen ones.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use controller_core::event::JiraCodingPayload;
use controller_core::{ControllerResult, Event, RepoRef};
use controller_jira_client::JiraClient;
use controller_pipelines::{run_coding_pipeline, CodingTask, PipelineContext, JIRA_DEDUP_TTL};
use tracing::{debug, warn};

use crate::backoff::backoff_delay;
use crate::status::PollerStatus;

/// `project_map` entries are `jira project key -> repo clone url`
/// (`TrackerConfig.project_map`); `target_branch` is the configured default
/// branch new MRs are opened against (e.g. `main`).
pub async fn run_tracker_poller(
    ctx: Arc<PipelineContext>,
    jira: JiraClient,
    trigger_status: String,
    project_map: std::collections::HashMap<String, String>,
    target_branch: String,
    interval: Duration,
    status: Arc<PollerStatus>,
) {
    loop {
        let poll_start = Utc::now();
        let outcome = run_cycle(&ctx, &jira, &trigger_status, &project_map, &target_branch).await;
        let sleep_for = match outcome {
            Ok(()) => {
                status.record_success(poll_start);
                interval
            }
            Err(e) => {
                let failures = status.record_failure();
                warn!(error = %e, failures, "tracker poller cycle failed");
                backoff_delay(interval, failures)
            }
        };
        tokio::time::sleep(sleep_for).await;
    }
}

async fn run_cycle(
    ctx: &PipelineContext,
    jira: &JiraClient,
    trigger_status: &str,
    project_map: &std::collections::HashMap<String, String>,
    target_branch: &str,
) -> ControllerResult<()> {
    for (project_key, clone_url) in project_map {
        let jql = format!("project = {project_key} AND status = \"{trigger_status}\"");
        let issues = jira.search_by_status(&jql).await?;
        let repo = RepoRef::parse(clone_url, false)?;

        for issue in issues {
            let dedup_key = format!("jira:{}", issue.key);
            if ctx.store.is_seen(&dedup_key).await? {
                continue;
            }

            // Move the issue out of the trigger status before doing any work:
            // this is what keeps a restarted poller (in-memory dedup store
            // wiped) from picking the same issue back up.
            if !mark_in_progress(jira, &issue.key, &ctx.jira_in_progress_status).await {
                continue;
            }

            let event = Event::JiraCoding {
                project_id: 0,
                repo: repo.clone(),
                target_ref: target_branch.to_string(),
                payload: JiraCodingPayload {
                    issue_key: issue.key.clone(),
                    summary: issue.summary.clone(),
                    description: issue.description.clone(),
                },
            };
            let task = CodingTask::from_event(&event, "")?;
            debug!(issue_key = %issue.key, "poller: dispatching coding pipeline for jira issue");
            match run_coding_pipeline(ctx, task).await {
                Ok(_) => ctx.store.mark_seen(&dedup_key, JIRA_DEDUP_TTL).await?,
                Err(e) => warn!(issue_key = %issue.key, error = %e, "poller: coding pipeline failed"),
            }
        }
    }
    Ok(())
}

/// Transitions `issue_key` to `status_name`, logging and returning `false`
/// on failure so the caller can skip the issue for this cycle rather than
/// dispatch a pipeline run for an issue still sitting in the trigger status.
async fn mark_in_progress(jira: &JiraClient, issue_key: &str, status_name: &str) -> bool {
    match jira.transition_issue(issue_key, status_name).await {
        Ok(()) => true,
        Err(e) => {
            warn!(issue_key, error = %e, "poller: failed to transition jira issue to in-progress, skipping");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: String) -> JiraClient {
        JiraClient::new(reqwest::Client::new(), base_url, "test-token".to_string())
    }

    #[tokio::test]
    async fn mark_in_progress_transitions_the_issue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/3/issue/PROJ-1/transitions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transitions": [{"id": "11", "name": "In Progress"}],
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/api/3/issue/PROJ-1/transitions"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let jira = test_client(server.uri());
        assert!(mark_in_progress(&jira, "PROJ-1", "In Progress").await);
    }

    #[tokio::test]
    async fn mark_in_progress_returns_false_when_status_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/3/issue/PROJ-2/transitions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transitions": [{"id": "11", "name": "Done"}],
            })))
            .mount(&server)
            .await;

        let jira = test_client(server.uri());
        assert!(!mark_in_progress(&jira, "PROJ-2", "In Progress").await);
    }
}
