use anyhow::Context as _;
use flotilla_backend::env::{
    optional_trimmed_path_from_env, optional_trimmed_string_from_env, resolve_flotilla_root,
};
use flotilla_domain::paths;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_IMAGE: &str = "flotilla-agent:latest";
pub const DEFAULT_AGENT_CMD: &str = "claude";

/// Forwarded into agent PTY sessions when set.
pub const CREDENTIAL_ENVS: [&str; 2] = ["ANTHROPIC_API_KEY", "CLAUDE_CODE_OAUTH_TOKEN"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    /// Provisioning and resume.
    pub create: Duration,
    /// Teardown, pause and prune.
    pub stop: Duration,
    pub logs: Duration,
    pub pull_request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(60),
            stop: Duration::from_secs(30),
            logs: Duration::from_secs(10),
            pull_request: Duration::from_secs(120),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub repo: PathBuf,
    pub flotilla_root: PathBuf,
    pub worktree_root: PathBuf,
    pub containers_root: PathBuf,
    pub image: String,
    pub agent_cmd: String,
    pub credentials: Vec<(String, String)>,
    pub timeouts: Timeouts,
    /// Never attach agent terminals. Used by one-shot maintenance commands.
    pub headless: bool,
}

impl EngineConfig {
    /// Defaults for everything below `flotilla_root`.
    pub fn new(repo: PathBuf, flotilla_root: PathBuf) -> Self {
        Self {
            repo,
            worktree_root: paths::worktrees_root(&flotilla_root),
            containers_root: paths::containers_root(&flotilla_root),
            flotilla_root,
            image: DEFAULT_IMAGE.to_owned(),
            agent_cmd: DEFAULT_AGENT_CMD.to_owned(),
            credentials: Vec::new(),
            timeouts: Timeouts::default(),
            headless: false,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let flotilla_root = resolve_flotilla_root()?;
        let repo = match optional_trimmed_path_from_env(paths::FLOTILLA_REPO_ENV)? {
            Some(repo) => repo,
            None => std::env::current_dir().context("failed to resolve current directory")?,
        };

        let mut config = Self::new(repo, flotilla_root);
        if let Some(root) = optional_trimmed_path_from_env(paths::FLOTILLA_WORKTREE_ROOT_ENV)? {
            config.worktree_root = root;
        }
        if let Some(image) = optional_trimmed_string_from_env(paths::FLOTILLA_IMAGE_ENV)? {
            config.image = image;
        }
        if let Some(agent_cmd) = optional_trimmed_string_from_env(paths::FLOTILLA_AGENT_CMD_ENV)? {
            config.agent_cmd = agent_cmd;
        }
        for name in CREDENTIAL_ENVS {
            if let Some(value) = optional_trimmed_string_from_env(name)? {
                config.credentials.push((name.to_owned(), value));
            }
        }

        Ok(config)
    }

    pub fn sqlite_path(&self) -> PathBuf {
        paths::sqlite_path(&self.flotilla_root)
    }
}
