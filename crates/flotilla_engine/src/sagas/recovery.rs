use super::{WorkstreamSnapshot, teardown};
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use flotilla_domain::{ContainerState, Message, ObservedContainer};
use std::collections::{BTreeSet, HashMap};

/// Tears down every given workstream, then removes stopped managed containers.
pub fn prune(
    deps: &Collaborators,
    config: &EngineConfig,
    workstreams: &[WorkstreamSnapshot],
) -> Message {
    let mut workstream_ids = Vec::with_capacity(workstreams.len());
    for workstream in workstreams {
        if let Message::WorkstreamStopped {
            warnings,
            stashed_changes,
            ..
        } = teardown(deps, config, workstream)
        {
            if !warnings.is_empty() {
                tracing::warn!(
                    workstream_id = %workstream.id,
                    warnings = warnings.len(),
                    "pruned with warnings"
                );
            }
            if stashed_changes {
                tracing::warn!(workstream_id = %workstream.id, "pruned a paired workstream; local changes remain stashed");
            }
        }
        workstream_ids.push(workstream.id.clone());
    }

    let containers_removed = match deps.runtime.prune_managed_containers() {
        Ok(removed) => removed,
        Err(err) => {
            tracing::warn!(error = %err, "failed to prune managed containers");
            0
        }
    };

    Message::Pruned {
        workstream_ids,
        containers_removed,
    }
}

/// Re-observes the containers of known workstreams and removes managed
/// containers that no workstream owns.
///
/// Orphans come from two places: crash-tracker records and containers that
/// carry the workstream label. Either is an orphan when its workstream is
/// unknown, or when the workstream is settled and records a different
/// container (or none).
pub fn recover_crashed(deps: &Collaborators, known: &[WorkstreamSnapshot]) -> Message {
    let owners = known
        .iter()
        .map(|w| (w.id.as_str(), w))
        .collect::<HashMap<_, _>>();
    let is_orphan = |workstream_id: &str, container_id: &str| match owners.get(workstream_id) {
        None => true,
        Some(owner) => !owner.in_flight && owner.container_id.as_deref() != Some(container_id),
    };
    let mut orphans = BTreeSet::new();

    match deps.tracker.records() {
        Ok(records) => {
            for record in records {
                if is_orphan(&record.workstream_id, &record.container_id) {
                    orphans.insert(record.container_id);
                }
            }
        }
        Err(err) => tracing::warn!(error = %err, "failed to read crash records"),
    }

    match deps.runtime.list_managed_containers() {
        Ok(containers) => {
            for container in containers {
                if let Some(workstream_id) = container.workstream_id.as_deref()
                    && is_orphan(workstream_id, &container.id)
                {
                    orphans.insert(container.id);
                }
            }
        }
        Err(err) => tracing::warn!(error = %err, "failed to list managed containers"),
    }

    let mut orphans_removed = Vec::new();
    for container_id in orphans {
        if remove_orphan(deps, &container_id) {
            orphans_removed.push(container_id);
        }
    }

    let mut observed = Vec::new();
    for workstream in known {
        let Some(container_id) = workstream.container_id.as_deref() else {
            continue;
        };
        match deps.runtime.container_state(container_id) {
            Ok(state) => {
                if state == ContainerState::Missing
                    && let Err(err) = deps.tracker.untrack(container_id)
                {
                    tracing::warn!(container_id, error = %err, "failed to untrack missing container");
                }
                observed.push(ObservedContainer {
                    workstream_id: workstream.id.clone(),
                    container_id: container_id.to_owned(),
                    state,
                });
            }
            Err(err) => {
                tracing::warn!(workstream_id = %workstream.id, container_id, error = %err, "failed to inspect container");
            }
        }
    }

    if !orphans_removed.is_empty() {
        tracing::info!(count = orphans_removed.len(), "removed orphaned containers");
    }
    Message::CrashRecoveryCompleted {
        orphans_removed,
        observed,
    }
}

fn remove_orphan(deps: &Collaborators, container_id: &str) -> bool {
    if let Err(err) = deps.runtime.stop_container(container_id) {
        tracing::warn!(container_id, error = %err, "failed to stop orphaned container");
    }
    if let Err(err) = deps.runtime.remove_container(container_id) {
        tracing::warn!(container_id, error = %err, "failed to remove orphaned container");
        return false;
    }
    if let Err(err) = deps.tracker.untrack(container_id) {
        tracing::warn!(container_id, error = %err, "failed to untrack orphaned container");
    }
    true
}
