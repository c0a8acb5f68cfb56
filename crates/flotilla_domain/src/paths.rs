use std::path::{Path, PathBuf};

pub const FLOTILLA_ROOT_ENV: &str = "FLOTILLA_ROOT";
pub const FLOTILLA_REPO_ENV: &str = "FLOTILLA_REPO";
pub const FLOTILLA_WORKTREE_ROOT_ENV: &str = "FLOTILLA_WORKTREE_ROOT";
pub const FLOTILLA_IMAGE_ENV: &str = "FLOTILLA_IMAGE";
pub const FLOTILLA_AGENT_CMD_ENV: &str = "FLOTILLA_AGENT_CMD";

pub fn worktrees_root(flotilla_root: &Path) -> PathBuf {
    flotilla_root.join("worktrees")
}

pub fn containers_root(flotilla_root: &Path) -> PathBuf {
    flotilla_root.join("containers")
}

pub fn sqlite_path(flotilla_root: &Path) -> PathBuf {
    flotilla_root.join("flotilla.db")
}

/// Per-container agent config directory. Each container gets its own copy so
/// concurrent agents never write to the same config files.
pub fn container_config_dir(containers_root: &Path, workstream_id: &str) -> PathBuf {
    containers_root.join(workstream_id).join("agent-config")
}

/// Directory component used for a branch's worktree: `/` then ` ` become `-`.
pub fn branch_dir_name(branch_name: &str) -> String {
    branch_name.replace('/', "-").replace(' ', "-")
}

/// `<worktree-root>/<branch with "/" and " " replaced by "-">`.
///
/// An empty branch name is not rejected and yields `<worktree-root>/`.
pub fn worktree_path(worktree_root: &Path, branch_name: &str) -> PathBuf {
    worktree_root.join(branch_dir_name(branch_name))
}
