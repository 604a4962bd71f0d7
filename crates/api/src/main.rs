//! Controller entrypoint (spec.md §6): loads config, wires the store,
//! executor, forge/tracker clients and pollers into one `PipelineContext`,
//! then serves the webhook/health HTTP surface.
//!
//! Bootstrap grounded on the teacher's root binary (`main-src-tmp/main.rs`'s
//! `dotenvy::dotenv()?` then start the service) and its logging layer
//! (`ai-llm-service/src/telemetry.rs`'s crate-scoped `EnvFilter`/`fmt` layer
//! pattern, generalized from one crate's target prefix to the whole binary).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use controller_core::config::{ExecutorKind, StateBackend};
use controller_core::{AppConfig, ControllerResult};
use controller_executor::{InProcessExecutor, IsolatedWorkerExecutor, TaskExecutor, WorkerOrchestratorClient};
use controller_gitlab_client::GitlabClient;
use controller_jira_client::JiraClient;
use controller_llm::AgentSession;
use controller_pipelines::PipelineContext;
use controller_pollers::{run_forge_poller, run_tracker_poller, PollerStatus};
use controller_store::Store;
use tracing::{info, warn};

/// Default per-call agent/clone timeout floor (spec.md §4.3/§4.5: clone
/// 60-120s, agent session 300s+); overridable for local tuning without
/// growing the spec-named config surface.
fn clone_timeout() -> Duration {
    Duration::from_secs(
        std::env::var("CLONE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90),
    )
}

fn task_timeout() -> Duration {
    Duration::from_secs(
        std::env::var("TASK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300),
    )
}

fn clone_dir() -> PathBuf {
    std::env::var("CLONE_DIR").map(PathBuf::from).unwrap_or_else(|_| std::env::temp_dir().join("controller-clones"))
}

/// Namespace the isolated-worker orchestrator creates Jobs in. Not part of
/// `AppConfig`'s spec-named surface — it's an implementation detail of the
/// in-cluster bootstrap, read directly here the way `WorkerEnv::from_env`
/// reads its own inputs straight from the environment.
fn worker_namespace() -> String {
    std::env::var("WORKER_NAMESPACE").unwrap_or_else(|_| "default".to_string())
}

fn init_telemetry(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true).init();

    if let Some(telemetry) = &config.telemetry {
        info!(otlp_endpoint = %telemetry.otlp_endpoint, environment = %telemetry.environment, "telemetry configured");
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("controller-api/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("static reqwest client config is valid")
}

fn build_executor(config: &AppConfig, store: &Store) -> ControllerResult<TaskExecutor> {
    match config.executor {
        ExecutorKind::InProcess => {
            let session = AgentSession::from_config(&config.llm)?;
            Ok(TaskExecutor::InProcess(InProcessExecutor::new(session)))
        }
        ExecutorKind::Isolated => {
            let worker_runtime = config
                .worker
                .clone()
                .expect("AppConfig::from_env only sets executor=isolated alongside worker config");
            let orchestrator = WorkerOrchestratorClient::in_cluster(&worker_namespace())?;
            let shared_store_url = match &config.state_backend {
                StateBackend::Shared { store_url } => store_url.clone(),
                StateBackend::Memory => {
                    return Err(controller_core::ControllerError::ConfigInvalid(
                        "isolated executor requires STATE_BACKEND=shared (workers publish results through it)".into(),
                    ));
                }
            };
            Ok(TaskExecutor::Isolated(IsolatedWorkerExecutor::new(
                orchestrator,
                store.clone(),
                shared_store_url,
                worker_runtime,
            )))
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().expect("failed to load .env file");

    let config = AppConfig::from_env().expect("invalid configuration");
    init_telemetry(&config);

    if let Err(err) = run(config).await {
        tracing::error!(error = %err, "controller exited with error");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> ControllerResult<()> {
    let config = Arc::new(config);
    let http = http_client();

    let store = match &config.state_backend {
        StateBackend::Memory => Store::in_memory(),
        StateBackend::Shared { store_url } => Store::shared(store_url).await?,
    };

    let gitlab = GitlabClient::new(http.clone(), config.forge_base_url.clone(), config.forge_token.clone());
    let jira = match &config.tracker {
        Some(tracker) => Some(JiraClient::new(http.clone(), tracker.base_url.clone(), tracker.auth_token.clone())),
        None => None,
    };

    let executor = build_executor(&config, &store)?;

    let ctx = Arc::new(PipelineContext {
        store,
        executor,
        gitlab: gitlab.clone(),
        jira: jira.clone(),
        forge_token: config.forge_token.clone(),
        agent_identity: config.agent_identity.clone(),
        clone_timeout: clone_timeout(),
        task_timeout: task_timeout(),
        clone_dir: clone_dir(),
        allow_http_clone: config.allow_http_clone,
        jira_in_progress_status: config.tracker.as_ref().map(|t| t.in_progress_status.clone()).unwrap_or_default(),
        jira_in_review_status: config.tracker.as_ref().map(|t| t.in_review_status.clone()).unwrap_or_default(),
    });

    let forge_poller = if config.poller.enabled {
        let status = Arc::new(PollerStatus::new(chrono::Utc::now()));
        let ctx = ctx.clone();
        let gitlab = gitlab.clone();
        let projects = config.project_allowlist.clone();
        let command_prefix = config.command_prefix.clone();
        let agent_identity = config.agent_identity.clone();
        let interval = config.poller.interval;
        let lookback = config.poller.lookback;
        let status_for_task = status.clone();
        tokio::spawn(async move {
            run_forge_poller(ctx, gitlab, projects, command_prefix, agent_identity, interval, lookback, status_for_task).await;
        });
        info!("forge poller started");
        Some(status)
    } else {
        None
    };

    let tracker_poller = match (&jira, &config.tracker, config.poller.enabled) {
        (Some(jira), Some(tracker), true) => {
            let status = Arc::new(PollerStatus::new(chrono::Utc::now()));
            let ctx = ctx.clone();
            let jira = jira.clone();
            let trigger_status = tracker.trigger_status.clone();
            let project_map: HashMap<String, String> = tracker.project_map.clone();
            let target_branch = std::env::var("TRACKER_TARGET_BRANCH").unwrap_or_else(|_| "main".to_string());
            let interval = config.poller.interval;
            let status_for_task = status.clone();
            tokio::spawn(async move {
                run_tracker_poller(ctx, jira, trigger_status, project_map, target_branch, interval, status_for_task).await;
            });
            info!("tracker poller started");
            Some(status)
        }
        _ => {
            if config.tracker.is_some() && !config.poller.enabled {
                warn!("tracker is configured but POLLER_ENABLED=false; Jira issues will not be discovered");
            }
            None
        }
    };

    let state = Arc::new(controller_api::AppState { config: config.clone(), ctx, forge_poller, tracker_poller });
    let router = controller_api::build_router(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| controller_core::ControllerError::ConfigInvalid(format!("failed to bind {bind_addr}: {e}")))?;
    info!(addr = %bind_addr, "controller listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| controller_core::ControllerError::Transient(format!("server error: {e}")))?;

    info!("shutdown signal received, exiting");
    Ok(())
}

/// Waits for SIGINT/SIGTERM (spec.md §5: "in-flight pipelines are allowed to
/// complete to a safe state... before exit"). Background pollers are daemon
/// tasks of the process itself — this only stops the HTTP listener from
/// accepting new webhook requests; already-spawned pipeline tasks keep
/// running to completion since they aren't tied to the listener's lifetime.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
