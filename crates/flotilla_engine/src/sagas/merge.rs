use super::{WorkstreamSnapshot, step};
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use anyhow::anyhow;
use flotilla_domain::{CreatedPullRequest, Message, merge_commit_message, pull_request_draft};
use std::path::PathBuf;

fn worktree(workstream: &WorkstreamSnapshot) -> anyhow::Result<PathBuf> {
    workstream
        .worktree_path
        .clone()
        .ok_or_else(|| anyhow!("workstream has no worktree"))
}

/// Pushes the branch, then opens a pull request for it. Neither step is undone
/// on failure.
pub fn create_pull_request(deps: &Collaborators, workstream: &WorkstreamSnapshot) -> Message {
    let workstream_id = workstream.id.clone();
    let branch = workstream.branch_name.as_str();

    let result = (|| -> anyhow::Result<CreatedPullRequest> {
        let path = worktree(workstream)?;
        step(
            deps.git.push(&path, branch),
            format!("failed to push {branch}"),
        )?;
        let draft = pull_request_draft(&workstream.prompt, branch);
        step(
            deps.pr_host.create_pull_request(&path, &draft),
            format!("failed to open pull request for {branch}"),
        )
    })();

    match result {
        Ok(created) => {
            tracing::info!(workstream_id = %workstream_id, url = %created.url, "pull request created");
            Message::PullRequestCreated {
                workstream_id,
                url: created.url,
                number: created.number,
            }
        }
        Err(err) => {
            let message = format!("{err:#}");
            tracing::error!(workstream_id = %workstream_id, error = %message, "pull request failed");
            Message::PullRequestFailed {
                workstream_id,
                message,
            }
        }
    }
}

/// Merges the workstream branch into the repository's main branch.
///
/// A dirty worktree is only committed when `commit_first` is set; otherwise
/// the caller is asked to decide.
pub fn merge(
    deps: &Collaborators,
    config: &EngineConfig,
    workstream: &WorkstreamSnapshot,
    commit_first: bool,
) -> Message {
    let workstream_id = workstream.id.clone();
    let branch = workstream.branch_name.as_str();

    let result = (|| -> anyhow::Result<Option<bool>> {
        let path = worktree(workstream)?;
        let dirty = step(
            deps.git.has_uncommitted_changes(&path),
            "failed to inspect worktree changes",
        )?;
        if dirty && !commit_first {
            return Ok(None);
        }
        if dirty {
            let message = merge_commit_message(&workstream.prompt, branch);
            step(
                deps.git.commit_all(&path, &message),
                format!("failed to commit changes on {branch}"),
            )?;
        }
        step(
            deps.git.merge_into_main(&config.repo, branch),
            format!("failed to merge {branch}"),
        )?;
        Ok(Some(dirty))
    })();

    match result {
        Ok(None) => Message::MergeNeedsCommit { workstream_id },
        Ok(Some(committed)) => {
            tracing::info!(workstream_id = %workstream_id, branch, committed, "branch merged");
            Message::Merged {
                workstream_id,
                committed,
            }
        }
        Err(err) => {
            let message = format!("{err:#}");
            tracing::error!(workstream_id = %workstream_id, error = %message, "merge failed");
            Message::MergeFailed {
                workstream_id,
                message,
            }
        }
    }
}
