//! `TaskParams` and `TaskResult` — the task executor's contract
//! (spec.md §3, §4.5).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    MrReview,
    MrCopilotCommand,
    JiraCoding,
}

/// Immutable parameters for a single task execution.
///
/// `task_id` is a stable hash derived from `kind|project|iid_or_key|head_sha`
/// and doubles as the isolated-worker idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskParams {
    pub task_id: String,
    pub kind: TaskKind,
    pub repo_clone_url: String,
    pub branch: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub timeout: Duration,
    /// Set only for in-process execution (the pre-cloned repo path).
    pub working_directory: Option<String>,
}

impl TaskParams {
    /// Derives the stable task id, used both as the dedup key for the
    /// coding pipeline's replay-safety contract and as the isolated-worker
    /// result cache key.
    pub fn derive_task_id(kind: TaskKind, project: &str, iid_or_key: &str, head_sha: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{kind:?}|{project}|{iid_or_key}|{head_sha}"));
        format!("{:x}", hasher.finalize())[..24].to_string()
    }
}

/// Tagged union task result (spec.md §3 "TaskResult").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskResult {
    Review {
        summary_text: String,
    },
    Coding {
        summary_text: String,
        /// Unified diff in binary-safe form, base64-encoded for JSON
        /// transport through the shared store.
        #[serde(with = "base64_bytes")]
        patch_bytes: Vec<u8>,
        base_commit_sha: String,
    },
    EmptyCoding {
        summary_text: String,
    },
}

impl TaskResult {
    /// Invariant (spec.md §3): for coding tasks via the isolated-worker
    /// executor, `patch_bytes` is never empty unless the result is
    /// `EmptyCodingResult`.
    pub fn validate(&self) -> Result<(), String> {
        if let TaskResult::Coding { patch_bytes, .. } = self {
            if patch_bytes.is_empty() {
                return Err(
                    "CodingResult.patch_bytes must not be empty — use EmptyCodingResult instead"
                        .into(),
                );
            }
        }
        Ok(())
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        BASE64.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_is_stable_and_distinct() {
        let a = TaskParams::derive_task_id(TaskKind::MrReview, "42", "7", "abc123");
        let b = TaskParams::derive_task_id(TaskKind::MrReview, "42", "7", "abc123");
        let c = TaskParams::derive_task_id(TaskKind::MrReview, "42", "7", "def456");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_patch_bytes_rejected_for_coding_result() {
        let r = TaskResult::Coding {
            summary_text: "x".into(),
            patch_bytes: vec![],
            base_commit_sha: "abc".into(),
        };
        assert!(r.validate().is_err());
    }

    #[test]
    fn non_empty_patch_bytes_accepted() {
        let r = TaskResult::Coding {
            summary_text: "x".into(),
            patch_bytes: vec![1, 2, 3],
            base_commit_sha: "abc".into(),
        };
        assert!(r.validate().is_ok());
    }

    #[test]
    fn coding_result_json_round_trip_preserves_binary_patch() {
        let r = TaskResult::Coding {
            summary_text: "x".into(),
            patch_bytes: vec![0, 255, 1, 2, 3, 4, 5],
            base_commit_sha: "abc".into(),
        };
        let json = serde_json::to_string(&r).unwrap();
        let back: TaskResult = serde_json::from_str(&json).unwrap();
        match back {
            TaskResult::Coding { patch_bytes, .. } => {
                assert_eq!(patch_bytes, vec![0, 255, 1, 2, 3, 4, 5])
            }
            _ => panic!("wrong variant"),
        }
    }
}
