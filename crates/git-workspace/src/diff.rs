use std::path::Path;

use controller_core::{ControllerError, ControllerResult};
use git2::{DiffFormat, DiffOptions, Repository};
use tracing::instrument;

use crate::run_blocking;

type GitResult<T> = Result<T, git2::Error>;

fn map_git_err(err: git2::Error) -> ControllerError {
    ControllerError::ExternalUnavailable(err.to_string())
}

#[instrument(skip(path), fields(path = %path.display()))]
pub async fn head_sha(path: &Path) -> ControllerResult<String> {
    let path = path.to_path_buf();
    run_blocking(move || head_sha_blocking(&path).map_err(map_git_err)).await
}

fn head_sha_blocking(path: &Path) -> GitResult<String> {
    let repo = Repository::open(path)?;
    let oid = repo.head()?.peel_to_commit()?.id();
    Ok(oid.to_string())
}

/// Produces a binary-safe unified diff of the index against `HEAD`,
/// equivalent to `git diff --cached --binary --no-prefix`, so the result is
/// directly consumable by `git apply --3way --binary` on the other side
/// (spec.md §4.3 `StagedDiff`).
#[instrument(skip(path), fields(path = %path.display()))]
pub async fn staged_diff(path: &Path) -> ControllerResult<Vec<u8>> {
    let path = path.to_path_buf();
    run_blocking(move || staged_diff_blocking(&path).map_err(map_git_err)).await
}

fn staged_diff_blocking(path: &Path) -> GitResult<Vec<u8>> {
    let repo = Repository::open(path)?;
    let head_tree = repo.head().ok().and_then(|h| h.peel_to_tree().ok());

    let mut opts = DiffOptions::new();
    opts.force_binary(true);
    opts.context_lines(3);

    let diff = repo.diff_tree_to_index(head_tree.as_ref(), None, Some(&mut opts))?;

    let mut buf = Vec::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        buf.extend_from_slice(line.content());
        true
    })?;
    Ok(buf)
}

/// Lists repo-relative paths with uncommitted working-tree changes (new,
/// modified, deleted, renamed), ignoring `.gitignore`d files. Used only as a
/// last-resort fallback when the agent's structured output omits the files
/// it touched (spec.md §4.6 step 5) — the worker otherwise stages exactly
/// the paths the agent claimed.
#[instrument(skip(path), fields(path = %path.display()))]
pub async fn changed_paths(path: &Path) -> ControllerResult<Vec<String>> {
    let path = path.to_path_buf();
    run_blocking(move || changed_paths_blocking(&path).map_err(map_git_err)).await
}

fn changed_paths_blocking(path: &Path) -> GitResult<Vec<String>> {
    let repo = Repository::open(path)?;
    let mut opts = git2::StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    let statuses = repo.statuses(Some(&mut opts))?;

    Ok(statuses
        .iter()
        .filter(|entry| !entry.status().contains(git2::Status::IGNORED))
        .filter_map(|entry| entry.path().map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;
    use std::path::Path;

    fn init_repo_with_commit(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
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
    async fn head_sha_matches_initial_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo_with_commit(dir.path());
        let expected = repo.head().unwrap().peel_to_commit().unwrap().id().to_string();
        assert_eq!(head_sha(dir.path()).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn staged_diff_empty_when_nothing_staged() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path());
        let diff = staged_diff(dir.path()).await.unwrap();
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn staged_diff_nonempty_after_staged_change() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo_with_commit(dir.path());
        std::fs::write(dir.path().join("README.md"), "hello\nworld\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();

        let diff = staged_diff(dir.path()).await.unwrap();
        assert!(!diff.is_empty());
        assert!(String::from_utf8_lossy(&diff).contains("README.md"));
    }

    #[tokio::test]
    async fn changed_paths_lists_new_and_modified_files() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path());
        std::fs::write(dir.path().join("README.md"), "hello\nworld\n").unwrap();
        std::fs::write(dir.path().join("new.txt"), "content").unwrap();

        let mut paths = changed_paths(dir.path()).await.unwrap();
        paths.sort();
        assert_eq!(paths, vec!["README.md".to_string(), "new.txt".to_string()]);
    }
}
