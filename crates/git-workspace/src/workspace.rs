use std::path::Path;

use controller_core::sanitize::{sanitize_url, scrub_secret};
use controller_core::{ControllerError, ControllerResult};
use git2::{Cred, PushOptions, RemoteCallbacks, Repository};
use tracing::{info, instrument};

use crate::run_blocking;

type GitResult<T> = Result<T, git2::Error>;

/// Maps a raw `git2::Error` into the controller's error taxonomy, scrubbing
/// any token that libgit2 might have echoed back into the message (spec.md
/// §4.3 "URL sanitization").
fn map_git_err(err: git2::Error) -> ControllerError {
    ControllerError::ExternalUnavailable(sanitize_url(&err.to_string()))
}

#[instrument(skip(path), fields(path = %path.display()))]
pub async fn checkout_new_branch(path: &Path, name: &str) -> ControllerResult<()> {
    let path = path.to_path_buf();
    let name = name.to_string();
    run_blocking(move || checkout_new_branch_blocking(&path, &name).map_err(map_git_err)).await
}

fn checkout_new_branch_blocking(path: &Path, name: &str) -> GitResult<()> {
    let repo = Repository::open(path)?;
    let head_commit = repo.head()?.peel_to_commit()?;
    repo.branch(name, &head_commit, false)?;
    repo.set_head(&format!("refs/heads/{name}"))?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))?;
    Ok(())
}

/// Probes `origin`'s remote refs and appends `-2, -3, …` to `base_name`
/// until a free branch name is found (spec.md §4.3).
#[instrument(skip(path), fields(path = %path.display()))]
pub async fn checkout_new_unique_branch(path: &Path, base_name: &str) -> ControllerResult<String> {
    let path = path.to_path_buf();
    let base_name = base_name.to_string();
    run_blocking(move || checkout_new_unique_branch_blocking(&path, &base_name).map_err(map_git_err)).await
}

fn checkout_new_unique_branch_blocking(path: &Path, base_name: &str) -> GitResult<String> {
    let repo = Repository::open(path)?;
    let existing = remote_branch_names(&repo)?;

    let mut candidate = base_name.to_string();
    let mut suffix = 2;
    while existing.contains(&candidate) {
        candidate = format!("{base_name}-{suffix}");
        suffix += 1;
    }

    let head_commit = repo.head()?.peel_to_commit()?;
    repo.branch(&candidate, &head_commit, false)?;
    repo.set_head(&format!("refs/heads/{candidate}"))?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))?;
    Ok(candidate)
}

fn remote_branch_names(repo: &Repository) -> GitResult<std::collections::HashSet<String>> {
    let mut names = std::collections::HashSet::new();
    for remote_branch in repo.branches(Some(git2::BranchType::Remote))? {
        let (branch, _) = remote_branch?;
        if let Some(name) = branch.name()? {
            if let Some(short) = name.split('/').nth(1) {
                names.insert(short.to_string());
            }
        }
    }
    Ok(names)
}

/// Stages every change in the working tree (spec.md §4.3 `StageAll`).
#[instrument(skip(path), fields(path = %path.display()))]
pub async fn stage_all(path: &Path) -> ControllerResult<()> {
    let path = path.to_path_buf();
    run_blocking(move || {
        (|| -> GitResult<()> {
            let repo = Repository::open(&path)?;
            let mut index = repo.index()?;
            index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
            index.write()?;
            Ok(())
        })()
        .map_err(map_git_err)
    })
    .await
}

/// Stages exactly the given repo-relative paths — no blanket `add_all`
/// (spec.md §4.6 "stage exactly those files"). A path missing from the
/// working tree is treated as a deletion.
#[instrument(skip(path, paths), fields(path = %path.display(), count = paths.len()))]
pub async fn stage_paths(path: &Path, paths: &[String]) -> ControllerResult<()> {
    let path = path.to_path_buf();
    let paths = paths.to_vec();
    run_blocking(move || stage_paths_blocking(&path, &paths).map_err(map_git_err)).await
}

fn stage_paths_blocking(path: &Path, paths: &[String]) -> GitResult<()> {
    let repo = Repository::open(path)?;
    let mut index = repo.index()?;
    for rel in paths {
        let full = path.join(rel);
        if full.exists() {
            index.add_path(Path::new(rel))?;
        } else {
            let _ = index.remove_path(Path::new(rel));
        }
    }
    index.write()?;
    Ok(())
}

/// Commits whatever is currently staged. Returns `false` (never an error)
/// when the staged tree is identical to `HEAD`'s tree (spec.md §4.3).
#[instrument(skip(path, author_email), fields(path = %path.display()))]
pub async fn commit_all_staged(
    path: &Path,
    message: &str,
    author_name: &str,
    author_email: &str,
) -> ControllerResult<bool> {
    let path = path.to_path_buf();
    let message = message.to_string();
    let author_name = author_name.to_string();
    let author_email = author_email.to_string();
    run_blocking(move || commit_all_staged_blocking(&path, &message, &author_name, &author_email).map_err(map_git_err)).await
}

fn commit_all_staged_blocking(path: &Path, message: &str, author_name: &str, author_email: &str) -> GitResult<bool> {
    let repo = Repository::open(path)?;
    let mut index = repo.index()?;
    let tree_oid = index.write_tree()?;
    let tree = repo.find_tree(tree_oid)?;

    let head = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    if let Some(ref head_commit) = head {
        if head_commit.tree_id() == tree_oid {
            return Ok(false);
        }
    }

    let signature = git2::Signature::now(author_name, author_email)?;
    let parents: Vec<&git2::Commit> = head.as_ref().into_iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
    info!("committed staged changes");
    Ok(true)
}

/// Pushes `branch` to `remote`, embedding `token` for the duration of the
/// push only. Fails clearly on non-fast-forward — the caller's repository
/// lock should already prevent this (spec.md §4.3).
#[instrument(skip(token), fields(path = %path.display(), remote, branch))]
pub async fn push(path: &Path, remote: &str, branch: &str, token: &str) -> ControllerResult<()> {
    let path = path.to_path_buf();
    let remote = remote.to_string();
    let branch = branch.to_string();
    let token = token.to_string();
    run_blocking(move || {
        let token_for_error = token.clone();
        push_blocking(&path, &remote, &branch, &token).map_err(|e| map_push_error(e, &token_for_error))
    })
    .await
}

fn push_blocking(path: &Path, remote_name: &str, branch: &str, token: &str) -> GitResult<()> {
    let repo = Repository::open(path)?;
    let mut remote = repo.find_remote(remote_name)?;

    let token = token.to_string();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username, _allowed| Cred::userpass_plaintext("oauth2", &token));

    let mut push_opts = PushOptions::new();
    push_opts.remote_callbacks(callbacks);

    let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
    remote.push(&[refspec.as_str()], Some(&mut push_opts))?;
    Ok(())
}

fn map_push_error(err: git2::Error, token: &str) -> ControllerError {
    let sanitized = scrub_secret(&sanitize_url(&err.to_string()), token);
    if err.code() == git2::ErrorCode::NotFastForward {
        ControllerError::Transient(format!("push rejected, not fast-forward: {sanitized}"))
    } else {
        ControllerError::ExternalUnavailable(format!("push failed: {sanitized}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo_with_commit(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        std::fs::write(dir.join("README.md"), "hello").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree_oid = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        let sig = git2::Signature::now("tester", "tester@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[]).unwrap();
        repo
    }

    #[tokio::test]
    async fn commit_all_staged_returns_false_on_clean_tree() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path());
        let committed = commit_all_staged(dir.path(), "noop", "bot", "bot@example.com").await.unwrap();
        assert!(!committed);
    }

    #[tokio::test]
    async fn stage_all_then_commit_creates_commit() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path());
        std::fs::write(dir.path().join("new.txt"), "content").unwrap();
        stage_all(dir.path()).await.unwrap();
        let committed = commit_all_staged(dir.path(), "add file", "bot", "bot@example.com").await.unwrap();
        assert!(committed);
    }

    #[tokio::test]
    async fn stage_paths_ignores_untouched_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo_with_commit(dir.path());
        std::fs::write(dir.path().join("touched.txt"), "content").unwrap();
        std::fs::write(dir.path().join("untouched.txt"), "content").unwrap();
        stage_paths(dir.path(), &["touched.txt".to_string()]).await.unwrap();
        let committed = commit_all_staged(dir.path(), "add touched", "bot", "bot@example.com").await.unwrap();
        assert!(committed);

        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(tree.get_path(Path::new("touched.txt")).is_ok());
        assert!(tree.get_path(Path::new("untouched.txt")).is_err());
    }

    #[tokio::test]
    async fn checkout_new_unique_branch_keeps_base_name_when_free() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path());
        let name = checkout_new_unique_branch(dir.path(), "copilot-fix").await.unwrap();
        assert_eq!(name, "copilot-fix");
    }

    #[tokio::test]
    async fn checkout_new_unique_branch_appends_suffix_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo_with_commit(dir.path());
        let head_oid = repo.head().unwrap().peel_to_commit().unwrap().id();
        // Simulate a remote-tracking branch fetched from origin without a real remote.
        repo.reference("refs/remotes/origin/copilot-fix", head_oid, true, "test fixture")
            .unwrap();

        let name = checkout_new_unique_branch(dir.path(), "copilot-fix").await.unwrap();
        assert_eq!(name, "copilot-fix-2");
    }
}
