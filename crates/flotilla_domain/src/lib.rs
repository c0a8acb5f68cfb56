mod adapters;
pub use adapters::{
    BRANCH_LABEL, ContainerConfig, ContainerRuntime, ContainerState, CrashRecoveryRecord,
    CrashTracker, CreatedPullRequest, ExecConnection, ExecRequest, FileSync, GitClient,
    MANAGED_LABEL, ManagedContainer, Mount, PullRequestDraft, PullRequestHost, WORKSTREAM_LABEL,
    WorkstreamStore,
};
mod branch;
pub use branch::{summarize_prompt, uniquify_branch_name};
mod messages;
pub use messages::{BranchMode, Message, ObservedContainer};
mod effects;
pub use effects::{Effect, Notice};
pub mod paths;
mod pull_request;
pub use pull_request::{merge_commit_message, pull_request_draft};
pub mod shell;

mod state;
pub use state::*;

mod reducer;
