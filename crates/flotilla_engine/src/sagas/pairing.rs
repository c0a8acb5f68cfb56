use super::{WorkstreamSnapshot, step};
use crate::collaborators::Collaborators;
use crate::compensation::Compensations;
use crate::config::EngineConfig;
use anyhow::anyhow;
use flotilla_domain::Message;

/// Mirrors the workstream's container into the local checkout.
///
/// Local edits are stashed first, then the sync session starts, then the
/// branch is checked out locally. A failed step undoes the earlier ones.
pub fn enable_pairing(
    deps: &Collaborators,
    config: &EngineConfig,
    workstream: &WorkstreamSnapshot,
) -> Message {
    let workstream_id = workstream.id.clone();
    let git = deps.git.as_ref();
    let sync = deps.sync.as_ref();
    let repo = config.repo.as_path();
    let branch = workstream.branch_name.as_str();

    let mut stashed_changes = false;
    let result = (|| -> anyhow::Result<String> {
        let container_id = workstream
            .container_id
            .as_deref()
            .ok_or_else(|| anyhow!("workstream has no container"))?;
        let path = workstream
            .worktree_path
            .as_deref()
            .ok_or_else(|| anyhow!("workstream has no worktree"))?;

        let previous_branch = step(git.current_branch(repo), "failed to read current branch")?;

        let mut compensations = Compensations::new();
        if step(
            git.has_uncommitted_changes(repo),
            "failed to inspect local changes",
        )? {
            step(git.stash(repo), "failed to stash local changes")?;
            stashed_changes = true;
            compensations.push("pop stash", || git.stash_pop(repo));
        }

        if let Err(err) = step(
            sync.create_session(branch, container_id, path),
            format!("failed to start sync for {branch}"),
        ) {
            compensations.rollback();
            return Err(err);
        }
        compensations.push("terminate sync", || sync.terminate_session(branch));

        if let Err(err) = step(
            git.checkout(repo, branch),
            format!("failed to check out {branch}"),
        ) {
            compensations.rollback();
            return Err(err);
        }

        compensations.commit();
        Ok(previous_branch)
    })();

    match result {
        Ok(previous_branch) => {
            tracing::info!(workstream_id = %workstream_id, branch, previous_branch = %previous_branch, "pairing enabled");
            Message::PairingEnabled {
                workstream_id,
                previous_branch,
                stashed_changes,
            }
        }
        Err(err) => {
            let message = format!("{err:#}");
            tracing::error!(workstream_id = %workstream_id, error = %message, "pairing enable failed");
            Message::PairingEnableFailed {
                workstream_id,
                message,
                stashed_changes,
            }
        }
    }
}

/// Ends the sync session and returns the local checkout to the branch it was
/// on before pairing. A recorded stash is left for the user to pop.
pub fn disable_pairing(
    deps: &Collaborators,
    config: &EngineConfig,
    workstream: &WorkstreamSnapshot,
) -> Message {
    let workstream_id = workstream.id.clone();
    let repo = config.repo.as_path();
    let branch = workstream.branch_name.as_str();

    if let Err(err) = deps.sync.terminate_session(branch) {
        tracing::warn!(workstream_id = %workstream_id, error = %err, "failed to terminate sync session");
    }

    let Some(pairing) = workstream.pairing.as_ref() else {
        return Message::PairingDisabled {
            workstream_id,
            stashed_changes: false,
        };
    };

    if pairing.previous_branch != branch
        && let Err(err) = deps.git.checkout(repo, &pairing.previous_branch)
    {
        let message = format!(
            "failed to check out {}: {err}",
            pairing.previous_branch
        );
        tracing::error!(workstream_id = %workstream_id, error = %message, "pairing disable failed");
        return Message::PairingDisableFailed {
            workstream_id,
            message,
        };
    }

    Message::PairingDisabled {
        workstream_id,
        stashed_changes: pairing.stashed_changes,
    }
}
