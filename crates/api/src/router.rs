//! Axum router wiring, generalized from the teacher's single ad-hoc
//! `trigger_mr_route` (`api/src/lib.rs`) to the full webhook+health surface.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;
use crate::health::health_handler;
use crate::json_extractor::json_error_mapper;
use crate::webhook::webhook_handler;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .layer(axum::middleware::from_fn(json_error_mapper))
        .with_state(state)
}
