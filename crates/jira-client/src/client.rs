//! Jira Cloud REST v3 client: issue search, two-step status transitions,
//! and comments (spec.md §4.4).
//!
//! Endpoints used:
//! - GET  /rest/api/3/search?jql=...&startAt=...&maxResults=...
//! - GET  /rest/api/3/issue/:key/transitions
//! - POST /rest/api/3/issue/:key/transitions
//! - POST /rest/api/3/issue/:key/comment

use controller_core::{ControllerError, ControllerResult};
use reqwest::Client;

use crate::types::{adf_to_plain_text, plain_text_to_adf, JiraIssue, JiraSearchResponse, JiraTransitionsResponse};

const PAGE_SIZE: u64 = 50;

#[derive(Debug, Clone)]
pub struct JiraClient {
    http: Client,
    base_url: String,
    auth_token: String,
}

impl JiraClient {
    pub fn new(http: Client, base_url: String, auth_token: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    fn issue_url(&self, key: &str, suffix: &str) -> String {
        format!("{}/rest/api/3/issue/{key}{suffix}", self.base_url)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> ControllerResult<T> {
        let resp = req
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ControllerError::ExternalUnavailable(format!(
                "jira request failed: status={status} body={body}"
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ControllerError::ResultInvalid(format!("jira response did not parse: {e}")))
    }

    /// `SearchByStatus(jql) → issues[]`, paginated (spec.md §4.4).
    pub async fn search_by_status(&self, jql: &str) -> ControllerResult<Vec<JiraIssue>> {
        let mut issues = Vec::new();
        let mut start_at = 0u64;

        loop {
            let url = format!(
                "{}/rest/api/3/search?jql={}&startAt={start_at}&maxResults={PAGE_SIZE}",
                self.base_url,
                urlencoding::encode(jql)
            );
            let page: JiraSearchResponse = self.send_json(self.http.get(url)).await?;
            let got = page.issues.len() as u64;

            issues.extend(page.issues.into_iter().map(|i| JiraIssue {
                key: i.key,
                summary: i.fields.summary,
                description: i.fields.description.as_ref().and_then(adf_to_plain_text),
            }));

            start_at += got;
            if got == 0 || start_at >= page.total {
                break;
            }
        }

        Ok(issues)
    }

    /// `TransitionIssue(key, status_name)`: looks up the transition id for
    /// the named target status, then applies it (spec.md §4.4, §6 "two-step
    /// lookup").
    pub async fn transition_issue(&self, key: &str, status_name: &str) -> ControllerResult<()> {
        let transitions_url = self.issue_url(key, "/transitions");
        let available: JiraTransitionsResponse = self.send_json(self.http.get(&transitions_url)).await?;

        let transition_id = available
            .transitions
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(status_name))
            .map(|t| t.id)
            .ok_or_else(|| {
                ControllerError::ResultInvalid(format!("jira issue {key} has no transition named {status_name}"))
            })?;

        #[derive(serde::Serialize)]
        struct TransitionRef {
            id: String,
        }
        #[derive(serde::Serialize)]
        struct Req {
            transition: TransitionRef,
        }

        let resp = self
            .http
            .post(&transitions_url)
            .bearer_auth(&self.auth_token)
            .json(&Req {
                transition: TransitionRef { id: transition_id },
            })
            .send()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ControllerError::ExternalUnavailable(format!(
                "jira transition failed: status={status} body={body}"
            )));
        }
        Ok(())
    }

    /// `AddComment(key, text)`, formatted as Jira's Atlassian Document
    /// Format (spec.md §4.4).
    pub async fn add_comment(&self, key: &str, text: &str) -> ControllerResult<()> {
        #[derive(serde::Serialize)]
        struct Req {
            body: serde_json::Value,
        }
        let url = self.issue_url(key, "/comment");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(&Req { body: plain_text_to_adf(text) })
            .send()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ControllerError::ExternalUnavailable(format!(
                "jira add comment failed: status={status} body={body}"
            )));
        }
        Ok(())
    }
}
