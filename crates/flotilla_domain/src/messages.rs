use crate::{ContainerState, PersistedWorkstream, WorkstreamId};
use std::path::PathBuf;

/// How provisioning resolves the workstream's branch.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum BranchMode {
    /// Create the branch; an existing branch is a conflict.
    #[default]
    New,
    /// Check out the existing branch into the worktree.
    UseExisting,
    /// Pick `<name>-N` that is free in `existing_branches` and the repository.
    Uniquify { existing_branches: Vec<String> },
    /// Delete the existing branch (and any worktree on it) and start fresh.
    Recreate,
}

/// Container state re-observed during crash recovery.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObservedContainer {
    pub workstream_id: WorkstreamId,
    pub container_id: String,
    pub state: ContainerState,
}

/// Everything the reducer consumes: user requests and the single result of
/// each background command.
#[derive(Clone, Debug)]
pub enum Message {
    AppStarted,
    StateLoaded {
        workstreams: Vec<PersistedWorkstream>,
    },
    StateLoadFailed {
        message: String,
    },
    StateSaved,
    StateSaveFailed {
        message: String,
    },
    TerminalResized {
        width: u16,
        height: u16,
    },

    CreateWorkstream {
        id: WorkstreamId,
        prompt: String,
        branch_name: String,
    },
    ProvisionWorkstream {
        workstream_id: WorkstreamId,
        mode: BranchMode,
    },
    BranchConflict {
        workstream_id: WorkstreamId,
        branch_name: String,
        info: String,
    },
    WorkstreamStarted {
        workstream_id: WorkstreamId,
        container_id: String,
        branch_name: String,
        worktree_path: PathBuf,
    },
    ProvisionFailed {
        workstream_id: WorkstreamId,
        message: String,
    },

    AttachPty {
        workstream_id: WorkstreamId,
    },
    PtyAttached {
        workstream_id: WorkstreamId,
        exec_id: String,
    },
    PtyAttachFailed {
        workstream_id: WorkstreamId,
        message: String,
    },
    PtyOutput {
        workstream_id: WorkstreamId,
        bytes: Vec<u8>,
    },
    PtyClosed {
        workstream_id: WorkstreamId,
        error: Option<String>,
    },
    DetachPty {
        workstream_id: WorkstreamId,
    },

    PauseWorkstream {
        workstream_id: WorkstreamId,
    },
    WorkstreamPaused {
        workstream_id: WorkstreamId,
    },
    PauseFailed {
        workstream_id: WorkstreamId,
        message: String,
    },
    ResumeWorkstream {
        workstream_id: WorkstreamId,
    },
    WorkstreamResumed {
        workstream_id: WorkstreamId,
    },
    ResumeFailed {
        workstream_id: WorkstreamId,
        message: String,
    },

    DestroyWorkstream {
        workstream_id: WorkstreamId,
    },
    WorkstreamStopped {
        workstream_id: WorkstreamId,
        branch_deleted: bool,
        /// A pairing stash was left in the local checkout.
        stashed_changes: bool,
        warnings: Vec<String>,
    },

    CreatePullRequest {
        workstream_id: WorkstreamId,
    },
    PullRequestCreated {
        workstream_id: WorkstreamId,
        url: String,
        number: u64,
    },
    PullRequestFailed {
        workstream_id: WorkstreamId,
        message: String,
    },

    MergeWorkstream {
        workstream_id: WorkstreamId,
        commit_first: bool,
    },
    MergeNeedsCommit {
        workstream_id: WorkstreamId,
    },
    Merged {
        workstream_id: WorkstreamId,
        committed: bool,
    },
    MergeFailed {
        workstream_id: WorkstreamId,
        message: String,
    },

    EnablePairing {
        workstream_id: WorkstreamId,
    },
    PairingEnabled {
        workstream_id: WorkstreamId,
        previous_branch: String,
        stashed_changes: bool,
    },
    PairingEnableFailed {
        workstream_id: WorkstreamId,
        message: String,
        stashed_changes: bool,
    },
    DisablePairing {
        workstream_id: WorkstreamId,
    },
    PairingDisabled {
        workstream_id: WorkstreamId,
        stashed_changes: bool,
    },
    PairingDisableFailed {
        workstream_id: WorkstreamId,
        message: String,
    },

    FetchLogs {
        workstream_id: WorkstreamId,
    },
    LogsFetched {
        workstream_id: WorkstreamId,
        logs: String,
    },
    LogsFetchFailed {
        workstream_id: WorkstreamId,
        message: String,
    },

    PruneWorkstreams,
    Pruned {
        workstream_ids: Vec<WorkstreamId>,
        containers_removed: usize,
    },

    RecoverCrashed,
    CrashRecoveryCompleted {
        orphans_removed: Vec<String>,
        observed: Vec<ObservedContainer>,
    },
}

impl Message {
    /// The workstream a message belongs to, if any.
    pub fn workstream_id(&self) -> Option<&WorkstreamId> {
        match self {
            Message::AppStarted
            | Message::StateLoaded { .. }
            | Message::StateLoadFailed { .. }
            | Message::StateSaved
            | Message::StateSaveFailed { .. }
            | Message::TerminalResized { .. }
            | Message::PruneWorkstreams
            | Message::Pruned { .. }
            | Message::RecoverCrashed
            | Message::CrashRecoveryCompleted { .. } => None,
            Message::CreateWorkstream { id, .. } => Some(id),
            Message::ProvisionWorkstream { workstream_id, .. }
            | Message::BranchConflict { workstream_id, .. }
            | Message::WorkstreamStarted { workstream_id, .. }
            | Message::ProvisionFailed { workstream_id, .. }
            | Message::AttachPty { workstream_id }
            | Message::PtyAttached { workstream_id, .. }
            | Message::PtyAttachFailed { workstream_id, .. }
            | Message::PtyOutput { workstream_id, .. }
            | Message::PtyClosed { workstream_id, .. }
            | Message::DetachPty { workstream_id }
            | Message::PauseWorkstream { workstream_id }
            | Message::WorkstreamPaused { workstream_id }
            | Message::PauseFailed { workstream_id, .. }
            | Message::ResumeWorkstream { workstream_id }
            | Message::WorkstreamResumed { workstream_id }
            | Message::ResumeFailed { workstream_id, .. }
            | Message::DestroyWorkstream { workstream_id }
            | Message::WorkstreamStopped { workstream_id, .. }
            | Message::CreatePullRequest { workstream_id }
            | Message::PullRequestCreated { workstream_id, .. }
            | Message::PullRequestFailed { workstream_id, .. }
            | Message::MergeWorkstream { workstream_id, .. }
            | Message::MergeNeedsCommit { workstream_id }
            | Message::Merged { workstream_id, .. }
            | Message::MergeFailed { workstream_id, .. }
            | Message::EnablePairing { workstream_id }
            | Message::PairingEnabled { workstream_id, .. }
            | Message::PairingEnableFailed { workstream_id, .. }
            | Message::DisablePairing { workstream_id }
            | Message::PairingDisabled { workstream_id, .. }
            | Message::PairingDisableFailed { workstream_id, .. }
            | Message::FetchLogs { workstream_id }
            | Message::LogsFetched { workstream_id, .. }
            | Message::LogsFetchFailed { workstream_id, .. } => Some(workstream_id),
        }
    }

    /// The error text carried by failure messages.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Message::StateLoadFailed { message }
            | Message::StateSaveFailed { message }
            | Message::ProvisionFailed { message, .. }
            | Message::PtyAttachFailed { message, .. }
            | Message::PauseFailed { message, .. }
            | Message::ResumeFailed { message, .. }
            | Message::PullRequestFailed { message, .. }
            | Message::MergeFailed { message, .. }
            | Message::PairingEnableFailed { message, .. }
            | Message::PairingDisableFailed { message, .. }
            | Message::LogsFetchFailed { message, .. } => Some(message),
            Message::PtyClosed { error, .. } => error.as_deref(),
            _ => None,
        }
    }
}
