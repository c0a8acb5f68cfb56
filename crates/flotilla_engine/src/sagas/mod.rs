//! Blocking multi-step operations. Each runs inside one [`crate::command::Command`]
//! and turns into exactly one terminal [`flotilla_domain::Message`].

use crate::collaborators::Collaborators;
use anyhow::anyhow;
use flotilla_domain::{GitClient, Pairing, Workstream, WorkstreamId};
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

mod lifecycle;
mod merge;
mod pairing;
mod provision;
mod recovery;
mod teardown;

pub use lifecycle::{LOG_TAIL_LINES, fetch_logs, pause, resume};
pub use merge::{create_pull_request, merge};
pub use pairing::{disable_pairing, enable_pairing};
pub use provision::provision;
pub use recovery::{prune, recover_crashed};
pub use teardown::teardown;

/// Mount point of the worktree inside every agent container.
pub const CONTAINER_WORKSPACE: &str = "/workspace";

/// Values a saga reads from a workstream, copied when the command is built.
#[derive(Clone, Debug)]
pub struct WorkstreamSnapshot {
    pub id: WorkstreamId,
    pub prompt: String,
    pub branch_name: String,
    pub container_id: Option<String>,
    pub worktree_path: Option<PathBuf>,
    pub pairing: Option<Pairing>,
    /// A provision, resume or teardown was running when the snapshot was taken.
    pub in_flight: bool,
}

impl From<&Workstream> for WorkstreamSnapshot {
    fn from(w: &Workstream) -> Self {
        Self {
            id: w.id.clone(),
            prompt: w.prompt.clone(),
            branch_name: w.branch_name.clone(),
            container_id: w.container_id.clone(),
            worktree_path: w.worktree_path.clone(),
            pairing: w.pairing.clone(),
            in_flight: w.state.is_transient(),
        }
    }
}

/// Lifts a collaborator result into `anyhow` with the step that failed.
fn step<T>(
    result: Result<T, String>,
    context: impl fmt::Display + Send + Sync + 'static,
) -> anyhow::Result<T> {
    result.map_err(|err| anyhow!(err).context(context))
}

/// Drops `path` from the worktree registry, then force-deletes the directory.
fn discard_worktree(git: &dyn GitClient, repo: &Path, path: &Path) -> Result<(), String> {
    let unregistered = git.remove_worktree(repo, path);
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(format!("failed to delete {}: {err}", path.display())),
    }
    unregistered
}

/// Containers tracked for, or labelled with, `workstream_id` other than `keep`.
fn stray_containers(
    deps: &Collaborators,
    workstream_id: &str,
    keep: Option<&str>,
) -> Result<BTreeSet<String>, String> {
    let mut strays = deps
        .tracker
        .records()?
        .into_iter()
        .filter(|record| record.workstream_id == workstream_id)
        .map(|record| record.container_id)
        .collect::<BTreeSet<_>>();
    strays.extend(
        deps.runtime
            .list_managed_containers()?
            .into_iter()
            .filter(|container| container.workstream_id.as_deref() == Some(workstream_id))
            .map(|container| container.id),
    );
    if let Some(keep) = keep {
        strays.remove(keep);
    }
    Ok(strays)
}
