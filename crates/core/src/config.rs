//! Strict env-var configuration loading into a discriminated `AppConfig`
//! (spec.md §6). Grounded on the teacher's
//! `ai-llm-service/src/config/default_config.rs` `must_env`/`ConfigError`
//! style: fail fast at startup, never at request time.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

fn must_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn opt_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match opt_env(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.to_string(),
            reason: format!("expected {} parseable value", std::any::type_name::<T>()),
        }),
    }
}

/// Tier of isolation for task execution (spec.md §6 `executor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    InProcess,
    Isolated,
}

/// Single- vs multi-replica state backend (spec.md §6 `state backend`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBackend {
    Memory,
    Shared { store_url: String },
}

/// Tracker (Jira) integration — disabled unless every field is present.
/// REDESIGN FLAGS: `TrackerConfig = None | Some{...}`, never a partially
/// populated struct with sentinel empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub base_url: String,
    pub auth_token: String,
    pub trigger_status: String,
    pub in_progress_status: String,
    pub in_review_status: String,
    /// Jira project key -> repository clone URL.
    pub project_map: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub lookback: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRuntimeConfig {
    pub image: String,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub timeout: Duration,
    pub secret_refs: Vec<String>,
    pub config_refs: Vec<String>,
    pub host_aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub kind: String,
    pub base_url: Option<String>,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub otlp_endpoint: String,
    pub environment: String,
}

/// The fully-loaded, validated configuration surface of spec.md §6.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub forge_base_url: String,
    pub forge_token: String,
    pub webhook_secret: String,
    pub llm: LlmConfig,
    pub executor: ExecutorKind,
    pub state_backend: StateBackend,
    pub project_allowlist: Vec<u64>,
    pub poller: PollerConfig,
    pub command_prefix: String,
    pub agent_identity: String,
    pub tracker: Option<TrackerConfig>,
    pub worker: Option<WorkerRuntimeConfig>,
    pub telemetry: Option<TelemetryConfig>,
    /// Testing only; normally forbidden (spec.md §6 "HTTP clone opt-in").
    pub allow_http_clone: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let forge_base_url = must_env("FORGE_BASE_URL")?;
        let forge_token = must_env("FORGE_TOKEN")?;
        let webhook_secret = must_env("WEBHOOK_SECRET")?;

        let llm = LlmConfig {
            kind: must_env("LLM_KIND")?,
            base_url: opt_env("LLM_BASE_URL"),
            api_key: must_env("LLM_API_KEY")?,
            model: must_env("LLM_MODEL")?,
        };

        let executor = match opt_env("EXECUTOR").as_deref() {
            None | Some("in_process") => ExecutorKind::InProcess,
            Some("isolated") => ExecutorKind::Isolated,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "EXECUTOR".into(),
                    reason: format!("expected in_process|isolated, got {other}"),
                });
            }
        };

        let state_backend = match opt_env("STATE_BACKEND").as_deref() {
            None | Some("memory") => StateBackend::Memory,
            Some("shared") => StateBackend::Shared {
                store_url: must_env("SHARED_STORE_URL")?,
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "STATE_BACKEND".into(),
                    reason: format!("expected memory|shared, got {other}"),
                });
            }
        };

        let project_allowlist = opt_env("PROJECT_ALLOWLIST")
            .map(|raw| {
                raw.split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                            var: "PROJECT_ALLOWLIST".into(),
                            reason: format!("not a u64 project id: {s}"),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let poller = PollerConfig {
            enabled: parse_env("POLLER_ENABLED", false)?,
            interval: Duration::from_secs(parse_env("POLLER_INTERVAL_SECS", 60u64)?),
            lookback: Duration::from_secs(parse_env("POLLER_LOOKBACK_SECS", 300u64)?),
        };

        let command_prefix = opt_env("COMMAND_PREFIX").unwrap_or_else(|| "/copilot ".to_string());
        let agent_identity = must_env("AGENT_IDENTITY")?;

        let tracker = match (
            opt_env("TRACKER_BASE_URL"),
            opt_env("TRACKER_AUTH_TOKEN"),
            opt_env("TRACKER_TRIGGER_STATUS"),
            opt_env("TRACKER_IN_PROGRESS_STATUS"),
            opt_env("TRACKER_IN_REVIEW_STATUS"),
        ) {
            (Some(base_url), Some(auth_token), Some(trigger_status), Some(in_progress_status), Some(in_review_status)) => {
                let project_map = opt_env("TRACKER_PROJECT_MAP")
                    .map(|raw| parse_project_map(&raw))
                    .transpose()?
                    .unwrap_or_default();
                Some(TrackerConfig {
                    base_url,
                    auth_token,
                    trigger_status,
                    in_progress_status,
                    in_review_status,
                    project_map,
                })
            }
            (None, None, None, None, None) => None,
            _ => {
                return Err(ConfigError::InvalidValue {
                    var: "TRACKER_*".into(),
                    reason: "tracker config must be fully present or fully absent".into(),
                });
            }
        };

        let worker = if executor == ExecutorKind::Isolated {
            Some(WorkerRuntimeConfig {
                image: must_env("WORKER_IMAGE")?,
                cpu_limit: opt_env("WORKER_CPU_LIMIT").unwrap_or_else(|| "1".to_string()),
                memory_limit: opt_env("WORKER_MEMORY_LIMIT").unwrap_or_else(|| "2Gi".to_string()),
                timeout: Duration::from_secs(parse_env("WORKER_TIMEOUT_SECS", 900u64)?),
                secret_refs: split_csv(opt_env("WORKER_SECRET_REFS")),
                config_refs: split_csv(opt_env("WORKER_CONFIG_REFS")),
                host_aliases: split_csv(opt_env("WORKER_HOST_ALIASES")),
            })
        } else {
            None
        };

        let telemetry = match (opt_env("TELEMETRY_OTLP_ENDPOINT"), opt_env("TELEMETRY_ENVIRONMENT")) {
            (Some(otlp_endpoint), Some(environment)) => Some(TelemetryConfig {
                otlp_endpoint,
                environment,
            }),
            _ => None,
        };

        let allow_http_clone = parse_env("ALLOW_HTTP_CLONE", false)?;

        Ok(Self {
            forge_base_url,
            forge_token,
            webhook_secret,
            llm,
            executor,
            state_backend,
            project_allowlist,
            poller,
            command_prefix,
            agent_identity,
            tracker,
            worker,
            telemetry,
            allow_http_clone,
        })
    }
}

fn split_csv(raw: Option<String>) -> Vec<String> {
    raw.map(|s| s.split(',').filter(|p| !p.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn parse_project_map(raw: &str) -> Result<std::collections::HashMap<String, String>, ConfigError> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| ConfigError::InvalidValue {
                    var: "TRACKER_PROJECT_MAP".into(),
                    reason: format!("expected key=value pairs, got: {pair}"),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_project_map_accepts_multiple_pairs() {
        let map = parse_project_map("ABC=https://gitlab.example.com/a.git,DEF=https://gitlab.example.com/d.git").unwrap();
        assert_eq!(map.get("ABC").unwrap(), "https://gitlab.example.com/a.git");
        assert_eq!(map.get("DEF").unwrap(), "https://gitlab.example.com/d.git");
    }

    #[test]
    fn parse_project_map_rejects_malformed_pair() {
        assert!(parse_project_map("ABC").is_err());
    }

    #[test]
    fn split_csv_filters_empty_segments() {
        assert_eq!(split_csv(Some("a,,b".to_string())), vec!["a", "b"]);
        assert_eq!(split_csv(None), Vec::<String>::new());
    }
}
