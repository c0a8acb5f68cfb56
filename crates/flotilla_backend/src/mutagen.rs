use crate::process::run_command;
use anyhow::{Context as _, anyhow};
use flotilla_domain::{FileSync, MANAGED_LABEL, paths};
use std::path::{Path, PathBuf};

const SESSION_PREFIX: &str = "flotilla-";
const CONTAINER_WORKSPACE: &str = "/workspace";

/// [`FileSync`] backed by `mutagen sync`, one session per branch.
#[derive(Clone, Debug)]
pub struct MutagenCli {
    binary: PathBuf,
}

impl Default for MutagenCli {
    fn default() -> Self {
        Self::new(PathBuf::from("mutagen"))
    }
}

/// Mutagen session names allow letters, digits and dashes only.
fn session_name(branch: &str) -> String {
    let mut name = String::from(SESSION_PREFIX);
    for ch in paths::branch_dir_name(branch).chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            name.push(ch);
        } else {
            name.push('-');
        }
    }
    name
}

impl MutagenCli {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn create_session_internal(
        &self,
        branch: &str,
        container_id: &str,
        path: &Path,
    ) -> anyhow::Result<()> {
        let local = path
            .to_str()
            .ok_or_else(|| anyhow!("invalid sync path: {}", path.display()))?;
        let name = session_name(branch);
        let label = format!("{MANAGED_LABEL}=true");
        let remote = format!("docker://{container_id}{CONTAINER_WORKSPACE}");
        run_command(
            self.binary.as_os_str(),
            None,
            [
                "sync",
                "create",
                "--name",
                name.as_str(),
                "--label",
                label.as_str(),
                "--sync-mode",
                "two-way-resolved",
                local,
                remote.as_str(),
            ],
        )
        .with_context(|| format!("failed to create sync session {name}"))?;
        Ok(())
    }
}

impl FileSync for MutagenCli {
    fn create_session(
        &self,
        branch: &str,
        container_id: &str,
        path: &Path,
    ) -> Result<(), String> {
        self.create_session_internal(branch, container_id, path)
            .map_err(|e| format!("{e:#}"))
    }

    fn terminate_session(&self, branch: &str) -> Result<(), String> {
        let name = session_name(branch);
        run_command(
            self.binary.as_os_str(),
            None,
            ["sync", "terminate", name.as_str()],
        )
        .map(|_| ())
        .with_context(|| format!("failed to terminate sync session {name}"))
        .map_err(|e| format!("{e:#}"))
    }
}
