//! `GET /health` (spec.md §6: `{status: ok, poller?: {running, failures,
//! cursor}}`). Reports the forge poller under the spec-named `poller` key
//! and, when a tracker is configured, the Jira poller under an additional
//! `tracker_poller` key — an enrichment the flat spec shape doesn't forbid.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
struct PollerHealth {
    running: bool,
    failures: u32,
    cursor: DateTime<Utc>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    poller: Option<PollerHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tracker_poller: Option<PollerHealth>,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let poller = state.forge_poller.as_ref().map(|s| {
        let snap = s.snapshot();
        PollerHealth { running: snap.running, failures: snap.failures, cursor: snap.cursor }
    });
    let tracker_poller = state.tracker_poller.as_ref().map(|s| {
        let snap = s.snapshot();
        PollerHealth { running: snap.running, failures: snap.failures, cursor: snap.cursor }
    });

    Json(HealthResponse { status: "ok", poller, tracker_poller }).into_response()
}
