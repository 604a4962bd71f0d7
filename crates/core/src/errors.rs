//! Crate-wide error taxonomy for the controller.
//!
//! Mirrors the layered shape of the teacher's `mr-reviewer::errors`: one root
//! enum with `#[from]` conversions, kept flat enough that every call site can
//! use `?` without manual mapping.

use thiserror::Error;

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Root error kind. Matches the taxonomy in spec.md §7 ("kinds, not types").
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Startup-only; fails the process.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Bad or missing webhook secret. Responded at the boundary, never
    /// reaches a pipeline.
    #[error("unauthorized")]
    Unauthorized,

    /// Forge/tracker/shared-store returned 5xx or the network failed.
    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),

    /// Lease renewal failed once, clone timed out, etc. Retried where safe.
    #[error("transient error: {0}")]
    Transient(String),

    /// LLM session exceeded its per-call budget.
    #[error("agent timed out after {0:?}")]
    AgentTimeout(std::time::Duration),

    /// Parse of agent output failed badly, base_sha mismatch, patch
    /// oversized, or path traversal in a patch. Fatal to the task.
    #[error("invalid result: {0}")]
    ResultInvalid(String),

    /// A note authored by the agent's own identity. Never surfaced as an
    /// error to the user; carried as a variant so call sites can match on it
    /// instead of using a sentinel bool.
    #[error("loop break: note authored by agent identity")]
    LoopBreak,

    /// Dedup hit. Logged at debug, no user-visible side effect.
    #[error("duplicate suppressed: {0}")]
    DuplicateSuppressed(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("other error: {0}")]
    Other(String),
}

impl ControllerError {
    /// True for errors that a caller may retry without operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ControllerError::ExternalUnavailable(_) | ControllerError::Transient(_)
        )
    }
}
