use crate::PullRequestDraft;
use crate::branch::summarize_prompt;

const TITLE_MAX_CHARS: usize = 72;

pub fn pull_request_draft(prompt: &str, branch_name: &str) -> PullRequestDraft {
    let title = match summarize_prompt(prompt, TITLE_MAX_CHARS) {
        summary if summary.is_empty() => branch_name.to_owned(),
        summary => summary,
    };

    let mut body = String::new();
    body.push_str("## Task\n\n");
    let prompt = prompt.trim();
    if prompt.is_empty() {
        body.push_str("_No prompt recorded._\n");
    } else {
        for line in prompt.lines() {
            body.push_str("> ");
            body.push_str(line);
            body.push('\n');
        }
    }
    body.push_str("\nBranch: `");
    body.push_str(branch_name);
    body.push_str("`\n");

    PullRequestDraft { title, body }
}

/// Message for the commit made before merging a dirty worktree.
pub fn merge_commit_message(prompt: &str, branch_name: &str) -> String {
    match summarize_prompt(prompt, TITLE_MAX_CHARS) {
        summary if summary.is_empty() => format!("Work from {branch_name}"),
        summary => summary,
    }
}
