use crate::{BranchMode, WorkstreamId};

/// Something the presentation layer should surface to the user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Notice {
    /// Provisioning found an existing branch. The caller answers with a
    /// `ProvisionWorkstream` carrying the chosen [`BranchMode`].
    BranchConflict { branch_name: String, info: String },
    MergeNeedsCommit,
    Merged { committed: bool },
    PullRequestCreated { url: String, number: u64 },
    /// Pairing was disabled with a stash still recorded; the user should pop it.
    StashReminder,
    Logs { text: String },
    Pruned { workstreams: usize, containers: usize },
    OrphansRemoved { containers: Vec<String> },
    Error { message: String },
}

#[derive(Clone, Debug)]
pub enum Effect {
    LoadState,
    SaveState,

    Provision {
        workstream_id: WorkstreamId,
        mode: BranchMode,
    },
    AttachPty {
        workstream_id: WorkstreamId,
        resume: bool,
        width: u16,
        height: u16,
    },
    ForwardPtyOutput {
        workstream_id: WorkstreamId,
        bytes: Vec<u8>,
    },
    ClosePty {
        workstream_id: WorkstreamId,
    },
    ResizePtys {
        width: u16,
        height: u16,
    },
    Pause {
        workstream_id: WorkstreamId,
    },
    Resume {
        workstream_id: WorkstreamId,
    },
    Teardown {
        workstream_id: WorkstreamId,
    },
    CreatePullRequest {
        workstream_id: WorkstreamId,
    },
    Merge {
        workstream_id: WorkstreamId,
        commit_first: bool,
    },
    EnablePairing {
        workstream_id: WorkstreamId,
    },
    DisablePairing {
        workstream_id: WorkstreamId,
    },
    FetchLogs {
        workstream_id: WorkstreamId,
    },
    Prune {
        workstream_ids: Vec<WorkstreamId>,
    },
    RecoverCrashed {
        known_workstreams: Vec<WorkstreamId>,
    },

    Notify {
        workstream_id: Option<WorkstreamId>,
        notice: Notice,
    },
}
