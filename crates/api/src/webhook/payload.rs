//! The webhook body DTO: a deliberately minimal, `deny_unknown_fields`
//! shape covering only the handful of fields the core depends on (spec.md
//! §4.1 "(2) Parses the body strictly — unknown fields forbidden, type
//! coercion forbidden"). This is a controller-defined ingestion schema, not
//! a passthrough of GitLab's full webhook wire format — the outbound
//! `gitlab-client`/`jira-client` still parse loosely against the real GitLab
//! API responses (SPEC_FULL.md "ordinary `Deserialize` at upstream-consuming
//! boundaries").

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum WebhookPayload {
    MergeRequest {
        action: MrAction,
        project_id: u64,
        iid: u64,
        source: String,
        target: String,
        last_commit_sha: String,
        #[serde(default)]
        oldrev: Option<String>,
        title: String,
        #[serde(default)]
        description: Option<String>,
    },
    Note {
        project_id: u64,
        /// IID of the merge request the note is attached to.
        iid: u64,
        note_id: u64,
        noteable_type: String,
        body: String,
        author_username: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MrAction {
    Open,
    Update,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_request_open_parses() {
        let raw = r#"{
            "kind": "merge_request",
            "action": "open",
            "project_id": 42,
            "iid": 7,
            "source": "feature",
            "target": "main",
            "last_commit_sha": "c1",
            "title": "Add thing"
        }"#;
        let payload: WebhookPayload = serde_json::from_str(raw).unwrap();
        match payload {
            WebhookPayload::MergeRequest { action, iid, .. } => {
                assert_eq!(action, MrAction::Open);
                assert_eq!(iid, 7);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_field_is_rejected() {
        let raw = r#"{
            "kind": "merge_request",
            "action": "open",
            "project_id": 42,
            "iid": 7,
            "source": "feature",
            "target": "main",
            "last_commit_sha": "c1",
            "title": "Add thing",
            "unexpected": "surprise"
        }"#;
        let result: Result<WebhookPayload, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn note_parses() {
        let raw = r#"{
            "kind": "note",
            "project_id": 42,
            "iid": 7,
            "note_id": 99,
            "noteable_type": "MergeRequest",
            "body": "/copilot fix foo",
            "author_username": "alice"
        }"#;
        let payload: WebhookPayload = serde_json::from_str(raw).unwrap();
        assert!(matches!(payload, WebhookPayload::Note { .. }));
    }
}
