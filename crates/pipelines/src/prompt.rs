//! Prompt assembly for the two task kinds, grounded on
//! `mr-reviewer/src/review/prompt.rs`'s "short system rules + task-shaped
//! user message" split.

/// System prompt for `mr_review` tasks: instructs the agent to emit a fenced
/// JSON array of comments followed by a free-text summary paragraph, the
/// wire format `controller_review::parse_review` expects (spec.md §4.7 step 5).
pub fn review_system_prompt() -> String {
    r#"You are a meticulous senior code reviewer.
- Be concise and actionable. Avoid generic advice.
- Only comment on lines actually changed in this merge request.
- Respond with a fenced ```json array of objects {file, line, severity, comment, suggestion?, suggestion_start_offset?, suggestion_end_offset?}, followed by a short summary paragraph.
- severity is one of "error", "warning", "info".
- If the change looks correct, return an empty array and say so in the summary."#
        .to_string()
}

pub fn review_user_prompt(title: &str, description: Option<&str>, source_branch: &str, target_branch: &str) -> String {
    format!(
        "# Merge Request\nTitle: {title}\nSource branch: {source_branch}\nTarget branch: {target_branch}\n{}\n\n# Task\nReview the changes checked out in this working directory and produce review comments per the required format.\n",
        description.map(|d| format!("Description: {d}")).unwrap_or_default()
    )
}

/// System prompt for coding tasks (`mr_copilot_command` / `jira_coding`):
/// instructs the agent to make the requested change on disk and report the
/// files it touched in the trailing fenced block
/// `controller-worker`'s `parse_coding_output` expects.
pub fn coding_system_prompt() -> String {
    r#"You are a careful senior software engineer making a focused code change.
- Make the minimal change needed to satisfy the request.
- Do not touch files unrelated to the request.
- After editing, respond with a fenced ```json object {files_touched: [...], summary: "..."} listing every file you changed, relative to the repository root."#
        .to_string()
}

pub fn coding_user_prompt_for_command(note_body: &str, command_prefix: &str) -> String {
    let instruction = note_body.strip_prefix(command_prefix).unwrap_or(note_body).trim();
    format!("# Request\n{instruction}\n\n# Task\nMake the requested change in this working directory.\n")
}

pub fn coding_user_prompt_for_issue(summary: &str, description: Option<&str>) -> String {
    format!(
        "# Issue\n{summary}\n{}\n\n# Task\nImplement this issue in this working directory.\n",
        description.map(|d| format!("Description: {d}")).unwrap_or_default()
    )
}
