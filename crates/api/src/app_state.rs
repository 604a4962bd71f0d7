//! Shared state for handlers, grounded on the teacher's
//! `api/src/core/app_state.rs` (`AppState{gitlab_api_base, gitlab_token,
//! trigger_secret}`), generalized to the full webhook/health surface: the
//! assembled `PipelineContext`, the loaded config, and both pollers' live
//! status for the health endpoint.

use std::sync::Arc;

use controller_core::AppConfig;
use controller_pipelines::PipelineContext;
use controller_pollers::PollerStatus;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub ctx: Arc<PipelineContext>,
    pub forge_poller: Option<Arc<PollerStatus>>,
    pub tracker_poller: Option<Arc<PollerStatus>>,
}
