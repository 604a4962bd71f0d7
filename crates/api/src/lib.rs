//! Webhook + health HTTP surface (spec.md §4.1, §6), generalized from the
//! teacher's single ad-hoc trigger route (`api/src/lib.rs`'s `start()`,
//! `api/src/routes/check_mr/trigger_mr_route.rs`) into the full
//! webhook-ingestion and health-reporting API.

pub mod app_state;
pub mod error;
mod health;
mod json_extractor;
pub mod response;
mod router;
mod webhook;

pub use app_state::AppState;
pub use router::build_router;
