use super::{
    Pairing, PersistedWorkstream, PtyStatus, PullRequestRef, Workstream, WorkstreamId,
    WorkstreamState,
};

pub const DEFAULT_TERMINAL_WIDTH: u16 = 120;
pub const DEFAULT_TERMINAL_HEIGHT: u16 = 40;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TerminalSize {
    pub width: u16,
    pub height: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_TERMINAL_WIDTH,
            height: DEFAULT_TERMINAL_HEIGHT,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub workstreams: Vec<Workstream>,
    pub terminal_size: TerminalSize,
    pub last_error: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workstreams: Vec::new(),
            terminal_size: TerminalSize::default(),
            last_error: None,
        }
    }

    pub fn workstream(&self, id: &WorkstreamId) -> Option<&Workstream> {
        self.workstreams.iter().find(|w| &w.id == id)
    }

    pub fn workstream_mut(&mut self, id: &WorkstreamId) -> Option<&mut Workstream> {
        self.workstreams.iter_mut().find(|w| &w.id == id)
    }

    /// Branch names already claimed by known workstreams.
    pub fn claimed_branch_names(&self) -> Vec<String> {
        self.workstreams
            .iter()
            .filter(|w| !w.branch_name.is_empty())
            .map(|w| w.branch_name.clone())
            .collect()
    }

    pub fn paired_workstream(&self) -> Option<&Workstream> {
        self.workstreams.iter().find(|w| w.pairing.is_some())
    }

    pub fn to_persisted(&self) -> Vec<PersistedWorkstream> {
        self.workstreams
            .iter()
            .map(|w| PersistedWorkstream {
                id: w.id.as_str().to_owned(),
                prompt: w.prompt.clone(),
                branch_name: w.branch_name.clone(),
                container_id: w.container_id.clone(),
                worktree_path: w.worktree_path.clone(),
                state: w.state.as_str().to_owned(),
                pr_url: w.pull_request.as_ref().map(|pr| pr.url.clone()),
                pr_number: w.pull_request.as_ref().map(|pr| pr.number),
                pairing_previous_branch: w.pairing.as_ref().map(|p| p.previous_branch.clone()),
                pairing_stashed_changes: w.pairing.as_ref().is_some_and(|p| p.stashed_changes),
                created_at_unix_ms: w.created_at_unix_ms,
            })
            .collect()
    }
}

impl From<PersistedWorkstream> for Workstream {
    fn from(p: PersistedWorkstream) -> Self {
        // A command that was in flight when the process died will never report
        // back, so transient states are settled to Failed on load.
        let state = match WorkstreamState::parse(&p.state) {
            Some(state) if state.is_transient() => WorkstreamState::Failed,
            Some(state) => state,
            None => WorkstreamState::Failed,
        };
        let pull_request = match (p.pr_url, p.pr_number) {
            (Some(url), Some(number)) => Some(PullRequestRef { url, number }),
            _ => None,
        };
        let pairing = p.pairing_previous_branch.map(|previous_branch| Pairing {
            previous_branch,
            stashed_changes: p.pairing_stashed_changes,
        });

        Workstream {
            id: WorkstreamId::from_string(p.id),
            prompt: p.prompt,
            branch_name: p.branch_name,
            container_id: p.container_id.filter(|id| !id.is_empty()),
            worktree_path: p.worktree_path,
            state,
            pull_request,
            pairing,
            pty: PtyStatus::Detached,
            pending: None,
            last_error: None,
            created_at_unix_ms: p.created_at_unix_ms,
        }
    }
}
