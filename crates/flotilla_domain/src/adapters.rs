use crate::PersistedWorkstream;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const MANAGED_LABEL: &str = "flotilla.managed";
pub const WORKSTREAM_LABEL: &str = "flotilla.workstream";
pub const BRANCH_LABEL: &str = "flotilla.branch";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Removing,
    Missing,
    Other(String),
}

impl ContainerState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            "removing" => ContainerState::Removing,
            "" | "missing" => ContainerState::Missing,
            other => ContainerState::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
            ContainerState::Removing => "removing",
            ContainerState::Missing => "missing",
            ContainerState::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    /// Host worktree mounted as the container workspace.
    pub workspace: Mount,
    /// Host repository `.git`, mounted at its host path so the worktree's
    /// `gitdir:` pointer resolves inside the container.
    pub git_dir: Mount,
    /// Isolated agent config directory for this container only.
    pub config_dir: Mount,
    pub working_dir: String,
    pub env: Vec<(String, String)>,
    pub labels: Vec<(String, String)>,
    /// Keeps the container alive; the agent itself runs through exec.
    pub command: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManagedContainer {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub workstream_id: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecRequest {
    pub container_id: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<String>,
    pub width: u16,
    pub height: u16,
}

/// A live interactive exec session with a pseudo-terminal.
pub trait ExecConnection: Send {
    fn exec_id(&self) -> &str;

    /// The output stream. Returns `None` once taken.
    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>>;

    /// The input stream. Returns `None` once taken.
    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>>;

    fn resize(&self, width: u16, height: u16) -> Result<(), String>;

    /// Ends the exec process and releases the connection. Unblocks a reader
    /// that is waiting on output.
    fn close(&mut self) -> Result<(), String>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrashRecoveryRecord {
    pub container_id: String,
    pub workstream_id: String,
    pub branch_name: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreatedPullRequest {
    pub url: String,
    pub number: u64,
}

pub trait GitClient: Send + Sync {
    fn create_and_checkout(&self, repo: &Path, branch: &str) -> Result<(), String>;

    /// New worktree at `path` on a new branch `branch`.
    fn create_worktree(&self, repo: &Path, path: &Path, branch: &str) -> Result<(), String>;

    fn create_worktree_from_existing(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
    ) -> Result<(), String>;

    fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<(), String>;

    fn worktree_for_branch(&self, repo: &Path, branch: &str) -> Result<Option<PathBuf>, String>;

    fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, String>;

    /// Whether `branch` has commits that are not on the repository's main line.
    fn branch_has_commits(&self, repo: &Path, branch: &str) -> Result<bool, String>;

    /// Free-form summary (recent commits, diff stat). Opaque to the engine.
    fn branch_info(&self, repo: &Path, branch: &str) -> Result<String, String>;

    fn delete_branch(&self, repo: &Path, branch: &str) -> Result<(), String>;

    fn push(&self, repo: &Path, branch: &str) -> Result<(), String>;

    fn checkout(&self, repo: &Path, branch: &str) -> Result<(), String>;

    fn current_branch(&self, repo: &Path) -> Result<String, String>;

    fn stash(&self, repo: &Path) -> Result<(), String>;

    fn stash_pop(&self, repo: &Path) -> Result<(), String>;

    fn has_uncommitted_changes(&self, repo: &Path) -> Result<bool, String>;

    fn commit_all(&self, repo: &Path, message: &str) -> Result<(), String>;

    fn merge_into_main(&self, repo: &Path, branch: &str) -> Result<(), String>;

    /// Branches that back a worktree under the managed worktree root.
    fn list_managed_branches(&self, repo: &Path) -> Result<Vec<String>, String>;
}

pub trait ContainerRuntime: Send + Sync {
    /// Creates the container and returns its id.
    fn create_container(&self, config: &ContainerConfig) -> Result<String, String>;

    fn start_container(&self, id: &str) -> Result<(), String>;

    fn stop_container(&self, id: &str) -> Result<(), String>;

    fn remove_container(&self, id: &str) -> Result<(), String>;

    fn pause_container(&self, id: &str) -> Result<(), String>;

    fn unpause_container(&self, id: &str) -> Result<(), String>;

    fn container_state(&self, id: &str) -> Result<ContainerState, String>;

    fn container_logs(&self, id: &str, tail: usize) -> Result<String, String>;

    fn exec_attach(&self, request: &ExecRequest) -> Result<Box<dyn ExecConnection>, String>;

    /// Removes stopped managed containers, returning how many were removed.
    fn prune_managed_containers(&self) -> Result<usize, String>;

    fn list_managed_containers(&self) -> Result<Vec<ManagedContainer>, String>;
}

pub trait FileSync: Send + Sync {
    fn create_session(&self, branch: &str, container_id: &str, path: &Path)
    -> Result<(), String>;

    fn terminate_session(&self, branch: &str) -> Result<(), String>;
}

pub trait PullRequestHost: Send + Sync {
    fn create_pull_request(
        &self,
        repo: &Path,
        draft: &PullRequestDraft,
    ) -> Result<CreatedPullRequest, String>;
}

pub trait CrashTracker: Send + Sync {
    fn track(&self, record: &CrashRecoveryRecord) -> Result<(), String>;

    fn untrack(&self, container_id: &str) -> Result<(), String>;

    fn records(&self) -> Result<Vec<CrashRecoveryRecord>, String>;
}

pub trait WorkstreamStore: Send + Sync {
    fn load_workstreams(&self) -> Result<Vec<PersistedWorkstream>, String>;

    fn save_workstreams(&self, workstreams: Vec<PersistedWorkstream>) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_state_parse_is_case_insensitive_and_trimmed() {
        assert_eq!(ContainerState::parse(" Running\n"), ContainerState::Running);
        assert_eq!(ContainerState::parse("PAUSED"), ContainerState::Paused);
        assert_eq!(ContainerState::parse("exited"), ContainerState::Exited);
        assert_eq!(ContainerState::parse(""), ContainerState::Missing);
        assert_eq!(
            ContainerState::parse("weird"),
            ContainerState::Other("weird".to_owned())
        );
    }

    #[test]
    fn container_state_displays_its_key() {
        assert_eq!(ContainerState::Exited.to_string(), "exited");
        assert_eq!(ContainerState::Other("odd".to_owned()).to_string(), "odd");
    }
}
