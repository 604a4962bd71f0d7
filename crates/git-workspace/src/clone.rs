use std::path::{Path, PathBuf};
use std::time::Duration;

use controller_core::sanitize::{sanitize_url, scrub_secret};
use controller_core::{ControllerError, ControllerResult, RepoRef};
use git2::build::RepoBuilder;
use tracing::{info, instrument, warn};

use crate::run_blocking;

/// Clones `repo` at `branch` into `dest_prefix/<repo-name>`, embedding
/// `token` into the authority portion of the URL (spec.md §4.3). Fails the
/// whole operation if it exceeds `timeout`; the token never reaches an
/// error surface or log line — every failure path is sanitized first.
#[instrument(skip(token), fields(repo = %sanitize_url(repo.as_str()), branch))]
pub async fn clone(
    repo: &RepoRef,
    branch: &str,
    token: &str,
    dest_prefix: &Path,
    timeout: Duration,
) -> ControllerResult<PathBuf> {
    let repo_name = repo_dir_name(repo.as_str());
    let dest = dest_prefix.join(format!("{repo_name}-{}", uuid::Uuid::new_v4()));
    let authenticated_url = repo.with_token(token);
    let branch = branch.to_string();
    let dest_for_blocking = dest.clone();
    let token = token.to_string();

    let clone_fut = run_blocking(move || clone_blocking(&authenticated_url, &branch, &dest_for_blocking, &token));

    match tokio::time::timeout(timeout, clone_fut).await {
        Ok(Ok(())) => {
            info!(path = %dest.display(), "clone completed");
            Ok(dest)
        }
        Ok(Err(err)) => Err(err),
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "clone timed out");
            Err(ControllerError::Transient(format!(
                "clone of {} timed out after {:?}",
                sanitize_url(repo.as_str()),
                timeout
            )))
        }
    }
}

fn clone_blocking(authenticated_url: &str, branch: &str, dest: &Path, token: &str) -> ControllerResult<()> {
    let mut builder = RepoBuilder::new();
    builder.branch(branch);
    builder.clone(authenticated_url, dest).map_err(|e| {
        let message = scrub_secret(&sanitize_url(&e.to_string()), token);
        ControllerError::ExternalUnavailable(format!("clone failed: {message}"))
    })?;
    Ok(())
}

fn repo_dir_name(clone_url: &str) -> String {
    clone_url
        .rsplit('/')
        .next()
        .map(|s| s.trim_end_matches(".git"))
        .filter(|s| !s.is_empty())
        .unwrap_or("repo")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_dir_name_strips_git_suffix() {
        assert_eq!(repo_dir_name("https://gitlab.example.com/group/project.git"), "project");
    }

    #[test]
    fn repo_dir_name_falls_back_on_trailing_slash() {
        assert_eq!(repo_dir_name("https://gitlab.example.com/group/"), "repo");
    }
}
