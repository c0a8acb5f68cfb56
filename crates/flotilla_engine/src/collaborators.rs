use crate::config::EngineConfig;
use anyhow::Context as _;
use flotilla_backend::{DockerCli, GhCli, GitCli, MutagenCli, SqliteStore};
use flotilla_domain::{
    ContainerRuntime, CrashTracker, FileSync, GitClient, PullRequestHost, WorkstreamStore,
};
use std::sync::Arc;

/// Everything the engine talks to outside the process. Injected, never global.
#[derive(Clone)]
pub struct Collaborators {
    pub git: Arc<dyn GitClient>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub sync: Arc<dyn FileSync>,
    pub pr_host: Arc<dyn PullRequestHost>,
    pub tracker: Arc<dyn CrashTracker>,
    pub store: Arc<dyn WorkstreamStore>,
}

impl Collaborators {
    /// CLI-backed collaborators plus the sqlite store under the flotilla root.
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let store = Arc::new(
            SqliteStore::new(config.sqlite_path()).context("failed to open workstream store")?,
        );
        Ok(Self {
            git: Arc::new(GitCli::new(config.worktree_root.clone())),
            runtime: Arc::new(DockerCli::default()),
            sync: Arc::new(MutagenCli::default()),
            pr_host: Arc::new(GhCli::default()),
            tracker: store.clone(),
            store,
        })
    }
}
