//! Repo-level skills/agents/instructions discovery.
//!
//! Out of scope in full (spec.md §1), but the pipelines need a concrete
//! contract to call before building `TaskParams.system_prompt`: walk a small
//! fixed set of well-known instruction files relative to the cloned working
//! directory and return their contents in a stable order.

use std::path::Path;

const WELL_KNOWN_FILES: &[&str] = &["AGENTS.md", "CLAUDE.md", ".agent/instructions.md"];

/// Reads every well-known instruction file present under `working_dir`, in a
/// stable order, skipping any that don't exist or fail to read as UTF-8.
pub fn discover_instructions(working_dir: &Path) -> Vec<String> {
    WELL_KNOWN_FILES
        .iter()
        .filter_map(|rel| std::fs::read_to_string(working_dir.join(rel)).ok())
        .filter(|content| !content.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_present_files_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "be nice").unwrap();
        let found = discover_instructions(dir.path());
        assert_eq!(found, vec!["be nice".to_string()]);
    }

    #[test]
    fn returns_empty_when_nothing_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_instructions(dir.path()).is_empty());
    }

    #[test]
    fn skips_blank_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "   \n").unwrap();
        assert!(discover_instructions(dir.path()).is_empty());
    }
}
