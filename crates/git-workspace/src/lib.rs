//! Git mechanics for the controller's managed working copies (spec.md
//! §4.3). Generalized from the teacher's `services/src/git.rs` SSH-keyfile
//! clone into the spec's HTTPS-token clone, and extended with the
//! branch/commit/push/diff/patch operations the teacher's module didn't
//! need. `git2` calls are blocking; every operation here runs inside
//! `tokio::task::spawn_blocking`, the same pattern the teacher's sibling
//! `project_code_store` crate used for concurrent clones.

mod clone;
mod diff;
mod patch;
mod workspace;

pub use clone::clone;
pub use diff::{changed_paths, head_sha, staged_diff};
pub use patch::{apply_patch, validate_patch};
pub use workspace::{checkout_new_branch, checkout_new_unique_branch, commit_all_staged, push, stage_all, stage_paths};

/// Patch size ceiling (spec.md §4.3, §8 invariant 9).
pub const MAX_PATCH_SIZE: usize = 10 * 1024 * 1024;

/// Default clone timeout (spec.md §4.3).
pub const DEFAULT_CLONE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

async fn run_blocking<F, T>(f: F) -> controller_core::ControllerResult<T>
where
    F: FnOnce() -> controller_core::ControllerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| controller_core::ControllerError::Transient(format!("git task join error: {e}")))?
}
