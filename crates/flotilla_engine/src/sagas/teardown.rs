use super::{WorkstreamSnapshot, discard_worktree, stray_containers};
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use flotilla_domain::{Message, paths};

/// Stops and removes everything a workstream owns. Never aborts: each failed
/// step becomes a warning and the workstream is reported stopped regardless.
///
/// A paired workstream first hands the local checkout back. Its stash, if
/// any, is left for the user.
pub fn teardown(
    deps: &Collaborators,
    config: &EngineConfig,
    workstream: &WorkstreamSnapshot,
) -> Message {
    let workstream_id = workstream.id.clone();
    let mut warnings = Vec::new();
    let mut warn = |what: &str, err: String| {
        tracing::warn!(workstream_id = %workstream_id, step = what, error = %err, "teardown step failed");
        warnings.push(format!("{what}: {err}"));
    };

    let repo = config.repo.as_path();
    let branch = workstream.branch_name.as_str();

    if let Some(pairing) = workstream.pairing.as_ref() {
        if let Err(err) = deps.sync.terminate_session(branch) {
            warn("terminate sync", err);
        }
        if pairing.previous_branch != branch
            && let Err(err) = deps.git.checkout(repo, &pairing.previous_branch)
        {
            warn("restore checkout", err);
        }
    }

    if let Some(container_id) = workstream.container_id.as_deref() {
        if let Err(err) = deps.runtime.stop_container(container_id) {
            warn("stop container", err);
        }
        if let Err(err) = deps.runtime.remove_container(container_id) {
            warn("remove container", err);
        }
        if let Err(err) = deps.tracker.untrack(container_id) {
            warn("untrack container", err);
        }
    }

    // Containers started by a provision whose result never reached the workstream.
    match stray_containers(deps, workstream.id.as_str(), workstream.container_id.as_deref()) {
        Ok(strays) => {
            for container_id in strays {
                if let Err(err) = deps.runtime.stop_container(&container_id) {
                    warn("stop stray container", err);
                }
                if let Err(err) = deps.runtime.remove_container(&container_id) {
                    warn("remove stray container", err);
                    continue;
                }
                if let Err(err) = deps.tracker.untrack(&container_id) {
                    warn("untrack stray container", err);
                }
            }
        }
        Err(err) => warn("list containers", err),
    }

    let worktree_path = match &workstream.worktree_path {
        Some(path) if !path.as_os_str().is_empty() => Some(path.clone()),
        _ if !branch.is_empty() => Some(paths::worktree_path(&config.worktree_root, branch)),
        _ => None,
    };
    if let Some(path) = worktree_path
        && let Err(err) = discard_worktree(deps.git.as_ref(), repo, &path)
    {
        warn("remove worktree", err);
    }

    let mut branch_deleted = false;
    if !branch.is_empty() {
        match deps.git.branch_exists(repo, branch) {
            Ok(false) => {}
            Ok(true) => match deps.git.branch_has_commits(repo, branch) {
                Ok(true) => {
                    tracing::info!(workstream_id = %workstream_id, branch, "keeping branch with commits");
                }
                Ok(false) => match deps.git.delete_branch(repo, branch) {
                    Ok(()) => branch_deleted = true,
                    Err(err) => warn("delete branch", err),
                },
                Err(err) => warn("inspect branch", err),
            },
            Err(err) => warn("inspect branch", err),
        }
    }

    if let Err(err) = std::fs::remove_dir_all(config.containers_root.join(workstream.id.as_str()))
        && err.kind() != std::io::ErrorKind::NotFound
    {
        warn("remove config dir", err.to_string());
    }

    Message::WorkstreamStopped {
        workstream_id: workstream.id.clone(),
        branch_deleted,
        stashed_changes: workstream
            .pairing
            .as_ref()
            .is_some_and(|pairing| pairing.stashed_changes),
        warnings,
    }
}
