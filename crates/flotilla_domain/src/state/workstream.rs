use super::WorkstreamId;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WorkstreamState {
    Created,
    Provisioning,
    /// Provisioning stopped on an existing branch; waits for the caller to pick
    /// a [`crate::BranchMode`].
    AwaitingBranchDecision,
    Running,
    Paused,
    Resuming,
    Stopping,
    Stopped,
    Failed,
}

impl WorkstreamState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkstreamState::Created => "created",
            WorkstreamState::Provisioning => "provisioning",
            WorkstreamState::AwaitingBranchDecision => "awaiting_branch_decision",
            WorkstreamState::Running => "running",
            WorkstreamState::Paused => "paused",
            WorkstreamState::Resuming => "resuming",
            WorkstreamState::Stopping => "stopping",
            WorkstreamState::Stopped => "stopped",
            WorkstreamState::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.trim() {
            "created" => WorkstreamState::Created,
            "provisioning" => WorkstreamState::Provisioning,
            "awaiting_branch_decision" => WorkstreamState::AwaitingBranchDecision,
            "running" => WorkstreamState::Running,
            "paused" => WorkstreamState::Paused,
            "resuming" => WorkstreamState::Resuming,
            "stopping" => WorkstreamState::Stopping,
            "stopped" => WorkstreamState::Stopped,
            "failed" => WorkstreamState::Failed,
            _ => return None,
        })
    }

    /// States that only exist while a command is in flight.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            WorkstreamState::Provisioning | WorkstreamState::Resuming | WorkstreamState::Stopping
        )
    }
}

impl fmt::Display for WorkstreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PtyStatus {
    Detached,
    Attaching,
    Attached,
}

/// Background operations that must not run twice for the same workstream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PendingOperation {
    Pause,
    PullRequest,
    Merge,
    PairingEnable,
    PairingDisable,
    Logs,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PullRequestRef {
    pub url: String,
    pub number: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pairing {
    pub previous_branch: String,
    pub stashed_changes: bool,
}

#[derive(Clone, Debug)]
pub struct Workstream {
    pub id: WorkstreamId,
    pub prompt: String,
    pub branch_name: String,
    pub container_id: Option<String>,
    pub worktree_path: Option<PathBuf>,
    pub state: WorkstreamState,
    pub pull_request: Option<PullRequestRef>,
    pub pairing: Option<Pairing>,
    pub pty: PtyStatus,
    pub pending: Option<PendingOperation>,
    pub last_error: Option<String>,
    pub created_at_unix_ms: u64,
}

impl Workstream {
    pub fn new(id: WorkstreamId, prompt: String, branch_name: String, now_unix_ms: u64) -> Self {
        Self {
            id,
            prompt,
            branch_name,
            container_id: None,
            worktree_path: None,
            state: WorkstreamState::Created,
            pull_request: None,
            pairing: None,
            pty: PtyStatus::Detached,
            pending: None,
            last_error: None,
            created_at_unix_ms: now_unix_ms,
        }
    }
}
