use std::path::PathBuf;

/// Storage shape of a [`super::Workstream`]; in-flight UI state is not kept.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedWorkstream {
    pub id: String,
    pub prompt: String,
    pub branch_name: String,
    pub container_id: Option<String>,
    pub worktree_path: Option<PathBuf>,
    pub state: String,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub pr_number: Option<u64>,
    pub pairing_previous_branch: Option<String>,
    pub pairing_stashed_changes: bool,
    pub created_at_unix_ms: u64,
}
