//! `WorkerOrchestratorClient` — a typed `reqwest` wrapper over a
//! Kubernetes-Job-shaped REST API (create/get/delete namespaced Job), built
//! in the same idiom as `gitlab-client`/`jira-client` since the teacher
//! corpus has no Kubernetes SDK dependency and the spec only needs
//! create/poll/delete semantics (spec.md §4.5).

use std::collections::HashMap;

use controller_core::config::WorkerRuntimeConfig;
use controller_core::{ControllerError, ControllerResult, TaskResult};
use serde::{Deserialize, Serialize};

/// Everything needed to materialize one worker Job.
pub struct WorkerSpec<'a> {
    pub name: String,
    pub env: Vec<(&'a str, String)>,
    pub runtime: &'a WorkerRuntimeConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    NotFound,
    Running,
    Succeeded,
    Failed,
}

pub struct WorkerOrchestratorClient {
    http: reqwest::Client,
    api_base: String,
    namespace: String,
    bearer_token: String,
}

impl WorkerOrchestratorClient {
    pub fn new(api_base: impl Into<String>, namespace: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            bearer_token: bearer_token.into(),
        }
    }

    /// Bootstraps from the standard in-cluster service-account mount
    /// (`KUBERNETES_SERVICE_HOST`/`_PORT` + the projected token file).
    /// Used by the worker binary and pipelines when `EXECUTOR=isolated`.
    pub fn in_cluster(namespace: &str) -> ControllerResult<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| ControllerError::ConfigInvalid("KUBERNETES_SERVICE_HOST is not set".into()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| ControllerError::ConfigInvalid("KUBERNETES_SERVICE_PORT is not set".into()))?;
        let token = std::fs::read_to_string("/var/run/secrets/kubernetes.io/serviceaccount/token")
            .map_err(|e| ControllerError::ConfigInvalid(format!("failed to read service account token: {e}")))?;
        Ok(Self::new(format!("https://{host}:{port}"), namespace, token.trim().to_string()))
    }

    fn jobs_url(&self) -> String {
        format!("{}/apis/batch/v1/namespaces/{}/jobs", self.api_base, self.namespace)
    }

    fn job_url(&self, name: &str) -> String {
        format!("{}/{name}", self.jobs_url())
    }

    /// Creates the Job. No-op-safe to call only once per worker name — the
    /// caller checks existence first (spec.md §4.5 step 3).
    pub async fn create_worker(&self, spec: &WorkerSpec<'_>) -> ControllerResult<()> {
        let manifest = job_manifest(spec);
        let resp = self
            .http
            .post(self.jobs_url())
            .bearer_auth(&self.bearer_token)
            .json(&manifest)
            .send()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ControllerError::ExternalUnavailable(format!(
                "failed to create worker {}: status={status} body={text}",
                spec.name
            )));
        }
        Ok(())
    }

    /// Returns the Job's phase, or `NotFound` if it doesn't exist (404 is not
    /// an error here — callers use this to decide whether to (re)create).
    pub async fn get_worker_phase(&self, name: &str) -> ControllerResult<WorkerPhase> {
        let resp = self
            .http
            .get(self.job_url(name))
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(WorkerPhase::NotFound);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ControllerError::ExternalUnavailable(format!(
                "failed to get worker {name}: status={status} body={text}"
            )));
        }

        let job: JobStatusResponse = resp
            .json()
            .await
            .map_err(|e| ControllerError::ResultInvalid(format!("worker status did not parse: {e}")))?;
        Ok(job.status.phase())
    }

    /// Reads the fallback result from the Job's last-result annotation
    /// (spec.md §4.5 step 6, "read the worker's last published annotation").
    pub async fn last_annotation_result(&self, name: &str) -> ControllerResult<Option<TaskResult>> {
        let resp = self
            .http
            .get(self.job_url(name))
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Ok(None);
        }

        let job: JobAnnotationsResponse = resp
            .json()
            .await
            .map_err(|e| ControllerError::ResultInvalid(format!("worker metadata did not parse: {e}")))?;

        match job.metadata.annotations.get(LAST_RESULT_ANNOTATION) {
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| ControllerError::ResultInvalid(format!("last-result annotation did not parse: {e}"))),
            None => Ok(None),
        }
    }

    /// Deletes the Job (background propagation — does not block on pod
    /// teardown).
    pub async fn delete_worker(&self, name: &str) -> ControllerResult<()> {
        let resp = self
            .http
            .delete(self.job_url(name))
            .bearer_auth(&self.bearer_token)
            .json(&DeleteOptions { propagation_policy: "Background" })
            .send()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ControllerError::ExternalUnavailable(format!(
                "failed to delete worker {name}: status={status} body={text}"
            )));
        }
        Ok(())
    }
}

const LAST_RESULT_ANNOTATION: &str = "controller.agent/last-result";

fn job_manifest(spec: &WorkerSpec<'_>) -> JobManifest {
    let env = spec
        .env
        .iter()
        .map(|(k, v)| EnvVar { name: (*k).to_string(), value: v.clone() })
        .collect();

    let secret_refs = spec
        .runtime
        .secret_refs
        .iter()
        .map(|name| EnvFromSource { secret_ref: Some(NamedRef { name: name.clone() }), config_map_ref: None })
        .collect::<Vec<_>>();
    let config_refs = spec
        .runtime
        .config_refs
        .iter()
        .map(|name| EnvFromSource { secret_ref: None, config_map_ref: Some(NamedRef { name: name.clone() }) })
        .collect::<Vec<_>>();
    let env_from = [secret_refs, config_refs].concat();

    let host_aliases = spec
        .runtime
        .host_aliases
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(ip, hostnames)| HostAlias {
            ip: ip.to_string(),
            hostnames: hostnames.split(',').map(str::to_string).collect(),
        })
        .collect();

    JobManifest {
        api_version: "batch/v1",
        kind: "Job",
        metadata: JobMetadata { name: spec.name.clone(), labels: HashMap::from([("app".to_string(), "agent-worker".to_string())]) },
        spec: JobSpec {
            ttl_seconds_after_finished: 300,
            backoff_limit: 0,
            active_deadline_seconds: spec.runtime.timeout.as_secs(),
            template: PodTemplate {
                spec: PodSpec {
                    restart_policy: "Never",
                    security_context: PodSecurityContext { run_as_non_root: true, run_as_user: 10000 },
                    host_aliases,
                    containers: vec![Container {
                        name: "agent-worker",
                        image: spec.runtime.image.clone(),
                        env,
                        env_from,
                        resources: Resources {
                            limits: ResourceQuantities {
                                cpu: spec.runtime.cpu_limit.clone(),
                                memory: spec.runtime.memory_limit.clone(),
                            },
                        },
                        security_context: ContainerSecurityContext {
                            read_only_root_filesystem: true,
                            allow_privilege_escalation: false,
                            capabilities: Capabilities { drop: vec!["ALL".to_string()] },
                        },
                        volume_mounts: vec![VolumeMount { name: "scratch", mount_path: "/scratch" }],
                    }],
                    volumes: vec![Volume { name: "scratch", empty_dir: EmptyDir {} }],
                },
            },
        },
    }
}

#[derive(Serialize)]
struct JobManifest {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    metadata: JobMetadata,
    spec: JobSpec,
}

#[derive(Serialize)]
struct JobMetadata {
    name: String,
    labels: HashMap<String, String>,
}

#[derive(Serialize)]
struct JobSpec {
    #[serde(rename = "ttlSecondsAfterFinished")]
    ttl_seconds_after_finished: u32,
    #[serde(rename = "backoffLimit")]
    backoff_limit: u32,
    #[serde(rename = "activeDeadlineSeconds")]
    active_deadline_seconds: u64,
    template: PodTemplate,
}

#[derive(Serialize)]
struct PodTemplate {
    spec: PodSpec,
}

#[derive(Serialize)]
struct PodSpec {
    #[serde(rename = "restartPolicy")]
    restart_policy: &'static str,
    #[serde(rename = "securityContext")]
    security_context: PodSecurityContext,
    #[serde(rename = "hostAliases")]
    host_aliases: Vec<HostAlias>,
    containers: Vec<Container>,
    volumes: Vec<Volume>,
}

#[derive(Serialize)]
struct PodSecurityContext {
    #[serde(rename = "runAsNonRoot")]
    run_as_non_root: bool,
    #[serde(rename = "runAsUser")]
    run_as_user: u32,
}

#[derive(Serialize)]
struct HostAlias {
    ip: String,
    hostnames: Vec<String>,
}

#[derive(Serialize)]
struct Container {
    name: &'static str,
    image: String,
    env: Vec<EnvVar>,
    #[serde(rename = "envFrom")]
    env_from: Vec<EnvFromSource>,
    resources: Resources,
    #[serde(rename = "securityContext")]
    security_context: ContainerSecurityContext,
    #[serde(rename = "volumeMounts")]
    volume_mounts: Vec<VolumeMount>,
}

#[derive(Serialize)]
struct EnvVar {
    name: String,
    value: String,
}

#[derive(Serialize)]
struct EnvFromSource {
    #[serde(rename = "secretRef", skip_serializing_if = "Option::is_none")]
    secret_ref: Option<NamedRef>,
    #[serde(rename = "configMapRef", skip_serializing_if = "Option::is_none")]
    config_map_ref: Option<NamedRef>,
}

#[derive(Serialize)]
struct NamedRef {
    name: String,
}

#[derive(Serialize)]
struct Resources {
    limits: ResourceQuantities,
}

#[derive(Serialize)]
struct ResourceQuantities {
    cpu: String,
    memory: String,
}

#[derive(Serialize)]
struct ContainerSecurityContext {
    #[serde(rename = "readOnlyRootFilesystem")]
    read_only_root_filesystem: bool,
    #[serde(rename = "allowPrivilegeEscalation")]
    allow_privilege_escalation: bool,
    capabilities: Capabilities,
}

#[derive(Serialize)]
struct Capabilities {
    drop: Vec<String>,
}

#[derive(Serialize)]
struct VolumeMount {
    name: &'static str,
    #[serde(rename = "mountPath")]
    mount_path: &'static str,
}

#[derive(Serialize)]
struct Volume {
    name: &'static str,
    #[serde(rename = "emptyDir")]
    empty_dir: EmptyDir,
}

#[derive(Serialize)]
struct EmptyDir {}

#[derive(Serialize)]
struct DeleteOptions {
    #[serde(rename = "propagationPolicy")]
    propagation_policy: &'static str,
}

#[derive(Deserialize)]
struct JobStatusResponse {
    status: JobStatus,
}

#[derive(Deserialize, Default)]
struct JobStatus {
    #[serde(default)]
    succeeded: u32,
    #[serde(default)]
    failed: u32,
}

impl JobStatus {
    fn phase(&self) -> WorkerPhase {
        if self.succeeded > 0 {
            WorkerPhase::Succeeded
        } else if self.failed > 0 {
            WorkerPhase::Failed
        } else {
            WorkerPhase::Running
        }
    }
}

#[derive(Deserialize)]
struct JobAnnotationsResponse {
    metadata: JobAnnotationsMetadata,
}

#[derive(Deserialize)]
struct JobAnnotationsMetadata {
    #[serde(default)]
    annotations: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn runtime() -> WorkerRuntimeConfig {
        WorkerRuntimeConfig {
            image: "registry.example.com/agent-worker:latest".into(),
            cpu_limit: "1".into(),
            memory_limit: "2Gi".into(),
            timeout: Duration::from_secs(900),
            secret_refs: vec!["forge-token".into()],
            config_refs: vec!["agent-config".into()],
            host_aliases: vec!["127.0.0.1=internal.example.com".into()],
        }
    }

    #[test]
    fn job_manifest_carries_env_and_security_context() {
        let runtime = runtime();
        let spec = WorkerSpec {
            name: "agent-worker-abc123".into(),
            env: vec![("TASK_ID", "abc123".into())],
            runtime: &runtime,
        };
        let manifest = job_manifest(&spec);
        let container = &manifest.spec.template.spec.containers[0];
        assert_eq!(container.env[0].name, "TASK_ID");
        assert!(container.security_context.read_only_root_filesystem);
        assert!(!container.security_context.allow_privilege_escalation);
        assert_eq!(container.security_context.capabilities.drop, vec!["ALL"]);
        assert_eq!(container.env_from.len(), 2);
        assert_eq!(manifest.spec.template.spec.host_aliases[0].hostnames, vec!["internal.example.com"]);
    }

    #[test]
    fn job_status_phase_prefers_succeeded_over_failed() {
        let status = JobStatus { succeeded: 1, failed: 0 };
        assert_eq!(status.phase(), WorkerPhase::Succeeded);
        let status = JobStatus { succeeded: 0, failed: 0 };
        assert_eq!(status.phase(), WorkerPhase::Running);
    }
}
