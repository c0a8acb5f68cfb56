//! In-memory collaborators for driving the engine and its sagas in tests.

use crate::collaborators::Collaborators;
use flotilla_domain::{
    ContainerConfig, ContainerRuntime, ContainerState, CrashRecoveryRecord, CrashTracker,
    CreatedPullRequest, ExecConnection, ExecRequest, FileSync, GitClient, ManagedContainer,
    PersistedWorkstream, PullRequestDraft, PullRequestHost, WORKSTREAM_LABEL, WorkstreamStore,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, mpsc};
use std::time::Duration;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn lock_env() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    locked(LOCK.get_or_init(|| Mutex::new(())))
}

pub struct EnvVarGuard {
    key: &'static str,
    prev: Option<OsString>,
}

impl EnvVarGuard {
    pub fn set(key: &'static str, value: impl AsRef<OsStr>) -> Self {
        let prev = std::env::var_os(key);
        unsafe {
            std::env::set_var(key, value);
        }
        Self { key, prev }
    }

    pub fn remove(key: &'static str) -> Self {
        let prev = std::env::var_os(key);
        unsafe {
            std::env::remove_var(key);
        }
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        unsafe {
            match &self.prev {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }
}

/// Ordered record of collaborator calls, shared by every fake of one world.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    fn push(&self, call: impl Into<String>) {
        locked(&self.calls).push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        locked(&self.calls).clone()
    }

    pub fn contains(&self, call: &str) -> bool {
        locked(&self.calls).iter().any(|c| c == call)
    }

    /// Position of the first call equal to `call`.
    pub fn position(&self, call: &str) -> Option<usize> {
        locked(&self.calls).iter().position(|c| c == call)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        locked(&self.calls)
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

/// Operation names that should fail on their next and every later call.
#[derive(Default)]
struct Failures {
    ops: Mutex<HashSet<&'static str>>,
}

impl Failures {
    fn set(&self, op: &'static str) {
        locked(&self.ops).insert(op);
    }

    fn clear(&self, op: &'static str) {
        locked(&self.ops).remove(op);
    }

    fn check(&self, op: &'static str) -> Result<(), String> {
        if locked(&self.ops).contains(op) {
            return Err(format!("{op} failed"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct TapState {
    written: Vec<u8>,
    resizes: Vec<(u16, u16)>,
    close_calls: usize,
}

/// Test-side view of a [`FakeExecConnection`].
#[derive(Clone)]
pub struct ExecTap {
    state: Arc<Mutex<TapState>>,
    output: Arc<Mutex<Option<mpsc::Sender<Result<Vec<u8>, String>>>>>,
}

impl ExecTap {
    pub fn written(&self) -> Vec<u8> {
        locked(&self.state).written.clone()
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        locked(&self.state).resizes.clone()
    }

    pub fn close_calls(&self) -> usize {
        locked(&self.state).close_calls
    }

    /// Emits more terminal output. Ignored once the connection closed.
    pub fn push_output(&self, bytes: &[u8]) {
        if let Some(tx) = locked(&self.output).as_ref() {
            let _ = tx.send(Ok(bytes.to_vec()));
        }
    }

    /// Ends the output stream as if the process exited.
    pub fn hang_up(&self) {
        locked(&self.output).take();
    }

    /// Fails the pending read and ends the stream, as a dropped connection does.
    pub fn fail_read(&self, message: &str) {
        if let Some(tx) = locked(&self.output).take() {
            let _ = tx.send(Err(message.to_owned()));
        }
    }
}

struct ChannelReader {
    rx: mpsc::Receiver<Result<Vec<u8>, String>>,
    pending: Vec<u8>,
    pos: usize,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.pending.len() {
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Ok(Err(message)) => return Err(io::Error::other(message)),
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

struct TapWriter {
    state: Arc<Mutex<TapState>>,
}

impl Write for TapWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        locked(&self.state).written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Exec connection whose output is fed through its [`ExecTap`].
pub struct FakeExecConnection {
    exec_id: String,
    state: Arc<Mutex<TapState>>,
    output: Arc<Mutex<Option<mpsc::Sender<Result<Vec<u8>, String>>>>>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
}

impl FakeExecConnection {
    pub fn new(exec_id: &str, initial_output: Vec<u8>) -> (Self, ExecTap) {
        let (tx, rx) = mpsc::channel();
        if !initial_output.is_empty() {
            let _ = tx.send(Ok(initial_output));
        }
        let state = Arc::new(Mutex::new(TapState::default()));
        let output = Arc::new(Mutex::new(Some(tx)));
        let connection = Self {
            exec_id: exec_id.to_owned(),
            state: state.clone(),
            output: output.clone(),
            reader: Some(Box::new(ChannelReader {
                rx,
                pending: Vec::new(),
                pos: 0,
            })),
            writer: Some(Box::new(TapWriter {
                state: state.clone(),
            })),
        };
        (connection, ExecTap { state, output })
    }
}

impl ExecConnection for FakeExecConnection {
    fn exec_id(&self) -> &str {
        &self.exec_id
    }

    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer.take()
    }

    fn resize(&self, width: u16, height: u16) -> Result<(), String> {
        locked(&self.state).resizes.push((width, height));
        Ok(())
    }

    /// Unblocks the reader with an error, like a closed docker exec stream.
    fn close(&mut self) -> Result<(), String> {
        locked(&self.state).close_calls += 1;
        if let Some(tx) = locked(&self.output).take() {
            let _ = tx.send(Err("use of closed network connection".to_owned()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct GitModel {
    /// Branch name to "has commits off main".
    branches: BTreeMap<String, bool>,
    worktrees: BTreeMap<PathBuf, String>,
    current: String,
    repo_dirty: bool,
    dirty_worktrees: BTreeSet<PathBuf>,
    stashes: usize,
}

pub struct FakeGit {
    log: CallLog,
    failures: Failures,
    model: Mutex<GitModel>,
}

impl FakeGit {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            failures: Failures::default(),
            model: Mutex::new(GitModel {
                current: "main".to_owned(),
                ..GitModel::default()
            }),
        }
    }

    fn model(&self) -> MutexGuard<'_, GitModel> {
        locked(&self.model)
    }

    pub fn fail(&self, op: &'static str) {
        self.failures.set(op);
    }

    pub fn add_branch(&self, branch: &str, has_commits: bool) {
        self.model().branches.insert(branch.to_owned(), has_commits);
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.model().branches.contains_key(branch)
    }

    pub fn worktrees(&self) -> Vec<(PathBuf, String)> {
        self.model()
            .worktrees
            .iter()
            .map(|(p, b)| (p.clone(), b.clone()))
            .collect()
    }

    pub fn set_repo_dirty(&self, dirty: bool) {
        self.model().repo_dirty = dirty;
    }

    pub fn set_worktree_dirty(&self, path: &Path) {
        self.model().dirty_worktrees.insert(path.to_path_buf());
    }

    pub fn current(&self) -> String {
        self.model().current.clone()
    }

    pub fn stashes(&self) -> usize {
        self.model().stashes
    }

    fn call(&self, op: &'static str, detail: &str) -> Result<(), String> {
        self.log.push(format!("git.{op} {detail}").trim_end().to_owned());
        self.failures.check(op)
    }
}

impl GitClient for FakeGit {
    fn create_and_checkout(&self, _repo: &Path, branch: &str) -> Result<(), String> {
        self.call("create_and_checkout", branch)?;
        let mut model = self.model();
        model.branches.insert(branch.to_owned(), false);
        model.current = branch.to_owned();
        Ok(())
    }

    fn create_worktree(&self, _repo: &Path, path: &Path, branch: &str) -> Result<(), String> {
        self.call("create_worktree", branch)?;
        let mut model = self.model();
        if model.branches.contains_key(branch) {
            return Err(format!("a branch named '{branch}' already exists"));
        }
        std::fs::create_dir_all(path).map_err(|e| e.to_string())?;
        model.branches.insert(branch.to_owned(), false);
        model.worktrees.insert(path.to_path_buf(), branch.to_owned());
        Ok(())
    }

    fn create_worktree_from_existing(
        &self,
        _repo: &Path,
        path: &Path,
        branch: &str,
    ) -> Result<(), String> {
        self.call("create_worktree_from_existing", branch)?;
        let mut model = self.model();
        if !model.branches.contains_key(branch) {
            return Err(format!("invalid reference: {branch}"));
        }
        std::fs::create_dir_all(path).map_err(|e| e.to_string())?;
        model.worktrees.insert(path.to_path_buf(), branch.to_owned());
        Ok(())
    }

    fn remove_worktree(&self, _repo: &Path, path: &Path) -> Result<(), String> {
        self.call("remove_worktree", &path.display().to_string())?;
        self.model().worktrees.remove(path);
        Ok(())
    }

    fn worktree_for_branch(&self, _repo: &Path, branch: &str) -> Result<Option<PathBuf>, String> {
        self.call("worktree_for_branch", branch)?;
        Ok(self
            .model()
            .worktrees
            .iter()
            .find(|(_, b)| b.as_str() == branch)
            .map(|(p, _)| p.clone()))
    }

    fn branch_exists(&self, _repo: &Path, branch: &str) -> Result<bool, String> {
        self.call("branch_exists", branch)?;
        Ok(branch == "main" || self.model().branches.contains_key(branch))
    }

    fn branch_has_commits(&self, _repo: &Path, branch: &str) -> Result<bool, String> {
        self.call("branch_has_commits", branch)?;
        Ok(self.model().branches.get(branch).copied().unwrap_or(false))
    }

    fn branch_info(&self, _repo: &Path, branch: &str) -> Result<String, String> {
        self.call("branch_info", branch)?;
        let commits = self.model().branches.get(branch).copied().unwrap_or(false);
        Ok(format!("{branch}: has commits = {commits}"))
    }

    fn delete_branch(&self, _repo: &Path, branch: &str) -> Result<(), String> {
        self.call("delete_branch", branch)?;
        let mut model = self.model();
        if model.worktrees.values().any(|b| b == branch) {
            return Err(format!("branch '{branch}' is checked out in a worktree"));
        }
        model.branches.remove(branch);
        Ok(())
    }

    fn push(&self, _repo: &Path, branch: &str) -> Result<(), String> {
        self.call("push", branch)
    }

    fn checkout(&self, _repo: &Path, branch: &str) -> Result<(), String> {
        self.call("checkout", branch)?;
        let mut model = self.model();
        if branch != "main" && !model.branches.contains_key(branch) {
            return Err(format!("pathspec '{branch}' did not match"));
        }
        model.current = branch.to_owned();
        Ok(())
    }

    fn current_branch(&self, _repo: &Path) -> Result<String, String> {
        self.call("current_branch", "")?;
        Ok(self.current())
    }

    fn stash(&self, _repo: &Path) -> Result<(), String> {
        self.call("stash", "")?;
        let mut model = self.model();
        model.repo_dirty = false;
        model.stashes += 1;
        Ok(())
    }

    fn stash_pop(&self, _repo: &Path) -> Result<(), String> {
        self.call("stash_pop", "")?;
        let mut model = self.model();
        if model.stashes == 0 {
            return Err("no stash entries found".to_owned());
        }
        model.stashes -= 1;
        model.repo_dirty = true;
        Ok(())
    }

    fn has_uncommitted_changes(&self, repo: &Path) -> Result<bool, String> {
        self.call("has_uncommitted_changes", "")?;
        let model = self.model();
        if model.worktrees.contains_key(repo) {
            return Ok(model.dirty_worktrees.contains(repo));
        }
        Ok(model.repo_dirty)
    }

    fn commit_all(&self, repo: &Path, _message: &str) -> Result<(), String> {
        self.call("commit_all", "")?;
        let mut model = self.model();
        model.dirty_worktrees.remove(repo);
        if let Some(branch) = model.worktrees.get(repo).cloned() {
            model.branches.insert(branch, true);
        }
        Ok(())
    }

    fn merge_into_main(&self, _repo: &Path, branch: &str) -> Result<(), String> {
        self.call("merge_into_main", branch)
    }

    fn list_managed_branches(&self, _repo: &Path) -> Result<Vec<String>, String> {
        self.call("list_managed_branches", "")?;
        Ok(self.model().worktrees.values().cloned().collect())
    }
}

struct FakeContainer {
    name: String,
    state: ContainerState,
    workstream_id: Option<String>,
}

#[derive(Default)]
struct RuntimeModel {
    containers: BTreeMap<String, FakeContainer>,
    configs: Vec<ContainerConfig>,
    next_id: u32,
    exec_output: Vec<u8>,
    exec_requests: Vec<ExecRequest>,
    taps: Vec<ExecTap>,
}

pub struct FakeRuntime {
    log: CallLog,
    failures: Failures,
    delays: Mutex<HashMap<&'static str, Duration>>,
    model: Mutex<RuntimeModel>,
}

impl FakeRuntime {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            failures: Failures::default(),
            delays: Mutex::new(HashMap::new()),
            model: Mutex::new(RuntimeModel::default()),
        }
    }

    fn model(&self) -> MutexGuard<'_, RuntimeModel> {
        locked(&self.model)
    }

    pub fn fail(&self, op: &'static str) {
        self.failures.set(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.failures.clear(op);
    }

    /// Makes every later `op` call block for `delay` before it runs.
    pub fn delay(&self, op: &'static str, delay: Duration) {
        locked(&self.delays).insert(op, delay);
    }

    pub fn insert_container(&self, id: &str, state: ContainerState, workstream_id: Option<&str>) {
        self.model().containers.insert(
            id.to_owned(),
            FakeContainer {
                name: format!("flotilla-{id}"),
                state,
                workstream_id: workstream_id.map(str::to_owned),
            },
        );
    }

    pub fn state_of(&self, id: &str) -> ContainerState {
        self.model()
            .containers
            .get(id)
            .map(|c| c.state.clone())
            .unwrap_or(ContainerState::Missing)
    }

    pub fn set_state(&self, id: &str, state: ContainerState) {
        if let Some(container) = self.model().containers.get_mut(id) {
            container.state = state;
        }
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.model().containers.keys().cloned().collect()
    }

    pub fn created_configs(&self) -> Vec<ContainerConfig> {
        self.model().configs.clone()
    }

    pub fn set_exec_output(&self, bytes: &[u8]) {
        self.model().exec_output = bytes.to_vec();
    }

    pub fn exec_requests(&self) -> Vec<ExecRequest> {
        self.model().exec_requests.clone()
    }

    pub fn exec_taps(&self) -> Vec<ExecTap> {
        self.model().taps.clone()
    }

    fn call(&self, op: &'static str, detail: &str) -> Result<(), String> {
        self.log.push(format!("runtime.{op} {detail}").trim_end().to_owned());
        let delay = locked(&self.delays).get(op).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.failures.check(op)
    }
}

impl ContainerRuntime for FakeRuntime {
    fn create_container(&self, config: &ContainerConfig) -> Result<String, String> {
        self.call("create", &config.name)?;
        let mut model = self.model();
        model.next_id += 1;
        let id = format!("c{}", model.next_id);
        let workstream_id = config
            .labels
            .iter()
            .find(|(k, _)| k == WORKSTREAM_LABEL)
            .map(|(_, v)| v.clone());
        model.containers.insert(
            id.clone(),
            FakeContainer {
                name: config.name.clone(),
                state: ContainerState::Created,
                workstream_id,
            },
        );
        model.configs.push(config.clone());
        Ok(id)
    }

    fn start_container(&self, id: &str) -> Result<(), String> {
        self.call("start", id)?;
        match self.model().containers.get_mut(id) {
            Some(container) => {
                container.state = ContainerState::Running;
                Ok(())
            }
            None => Err(format!("No such container: {id}")),
        }
    }

    fn stop_container(&self, id: &str) -> Result<(), String> {
        self.call("stop", id)?;
        if let Some(container) = self.model().containers.get_mut(id) {
            container.state = ContainerState::Exited;
        }
        Ok(())
    }

    fn remove_container(&self, id: &str) -> Result<(), String> {
        self.call("remove", id)?;
        self.model().containers.remove(id);
        Ok(())
    }

    fn pause_container(&self, id: &str) -> Result<(), String> {
        self.call("pause", id)?;
        match self.model().containers.get_mut(id) {
            Some(container) if container.state == ContainerState::Running => {
                container.state = ContainerState::Paused;
                Ok(())
            }
            Some(container) => Err(format!("container {id} is {}", container.state)),
            None => Err(format!("No such container: {id}")),
        }
    }

    fn unpause_container(&self, id: &str) -> Result<(), String> {
        self.call("unpause", id)?;
        match self.model().containers.get_mut(id) {
            Some(container) if container.state == ContainerState::Paused => {
                container.state = ContainerState::Running;
                Ok(())
            }
            Some(container) => Err(format!("container {id} is not paused ({})", container.state)),
            None => Err(format!("No such container: {id}")),
        }
    }

    fn container_state(&self, id: &str) -> Result<ContainerState, String> {
        self.call("state", id)?;
        Ok(self.state_of(id))
    }

    fn container_logs(&self, id: &str, tail: usize) -> Result<String, String> {
        self.call("logs", id)?;
        Ok(format!("last {tail} lines of {id}"))
    }

    fn exec_attach(&self, request: &ExecRequest) -> Result<Box<dyn ExecConnection>, String> {
        self.call("exec_attach", &request.container_id)?;
        let mut model = self.model();
        let running = model
            .containers
            .get(&request.container_id)
            .is_some_and(|c| c.state == ContainerState::Running);
        if !running {
            return Err(format!("container {} is not running", request.container_id));
        }
        let exec_id = format!("exec-{}", model.exec_requests.len() + 1);
        let (connection, tap) = FakeExecConnection::new(&exec_id, model.exec_output.clone());
        model.exec_requests.push(request.clone());
        model.taps.push(tap);
        Ok(Box::new(connection))
    }

    fn prune_managed_containers(&self) -> Result<usize, String> {
        self.call("prune", "")?;
        let mut model = self.model();
        let before = model.containers.len();
        model.containers.retain(|_, c| {
            !matches!(
                c.state,
                ContainerState::Exited | ContainerState::Dead | ContainerState::Created
            )
        });
        Ok(before - model.containers.len())
    }

    fn list_managed_containers(&self) -> Result<Vec<ManagedContainer>, String> {
        self.call("list", "")?;
        Ok(self
            .model()
            .containers
            .iter()
            .map(|(id, c)| ManagedContainer {
                id: id.clone(),
                name: c.name.clone(),
                state: c.state.clone(),
                workstream_id: c.workstream_id.clone(),
            })
            .collect())
    }
}

pub struct FakeSync {
    log: CallLog,
    failures: Failures,
    sessions: Mutex<BTreeSet<String>>,
}

impl FakeSync {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            failures: Failures::default(),
            sessions: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn fail(&self, op: &'static str) {
        self.failures.set(op);
    }

    pub fn sessions(&self) -> Vec<String> {
        locked(&self.sessions).iter().cloned().collect()
    }
}

impl FileSync for FakeSync {
    fn create_session(
        &self,
        branch: &str,
        _container_id: &str,
        _path: &Path,
    ) -> Result<(), String> {
        self.log.push(format!("sync.create {branch}"));
        self.failures.check("create")?;
        locked(&self.sessions).insert(branch.to_owned());
        Ok(())
    }

    fn terminate_session(&self, branch: &str) -> Result<(), String> {
        self.log.push(format!("sync.terminate {branch}"));
        self.failures.check("terminate")?;
        locked(&self.sessions).remove(branch);
        Ok(())
    }
}

pub struct FakePullRequestHost {
    log: CallLog,
    failures: Failures,
    drafts: Mutex<Vec<PullRequestDraft>>,
}

impl FakePullRequestHost {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            failures: Failures::default(),
            drafts: Mutex::new(Vec::new()),
        }
    }

    pub fn fail(&self) {
        self.failures.set("create");
    }

    pub fn drafts(&self) -> Vec<PullRequestDraft> {
        locked(&self.drafts).clone()
    }
}

impl PullRequestHost for FakePullRequestHost {
    fn create_pull_request(
        &self,
        _repo: &Path,
        draft: &PullRequestDraft,
    ) -> Result<CreatedPullRequest, String> {
        self.log.push("pr.create");
        self.failures.check("create")?;
        let mut drafts = locked(&self.drafts);
        drafts.push(draft.clone());
        let number = drafts.len() as u64;
        Ok(CreatedPullRequest {
            url: format!("https://github.com/acme/app/pull/{number}"),
            number,
        })
    }
}

#[derive(Default)]
pub struct MemoryTracker {
    failures: Failures,
    records: Mutex<Vec<CrashRecoveryRecord>>,
}

impl MemoryTracker {
    pub fn fail(&self, op: &'static str) {
        self.failures.set(op);
    }

    pub fn container_ids(&self) -> Vec<String> {
        locked(&self.records)
            .iter()
            .map(|r| r.container_id.clone())
            .collect()
    }
}

impl CrashTracker for MemoryTracker {
    fn track(&self, record: &CrashRecoveryRecord) -> Result<(), String> {
        self.failures.check("track")?;
        let mut records = locked(&self.records);
        records.retain(|r| r.container_id != record.container_id);
        records.push(record.clone());
        Ok(())
    }

    fn untrack(&self, container_id: &str) -> Result<(), String> {
        locked(&self.records).retain(|r| r.container_id != container_id);
        Ok(())
    }

    fn records(&self) -> Result<Vec<CrashRecoveryRecord>, String> {
        Ok(locked(&self.records).clone())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    workstreams: Mutex<Vec<PersistedWorkstream>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn with_workstreams(workstreams: Vec<PersistedWorkstream>) -> Self {
        Self {
            workstreams: Mutex::new(workstreams),
            saves: Mutex::new(0),
        }
    }

    pub fn saved(&self) -> Vec<PersistedWorkstream> {
        locked(&self.workstreams).clone()
    }

    pub fn save_count(&self) -> usize {
        *locked(&self.saves)
    }
}

impl WorkstreamStore for MemoryStore {
    fn load_workstreams(&self) -> Result<Vec<PersistedWorkstream>, String> {
        Ok(locked(&self.workstreams).clone())
    }

    fn save_workstreams(&self, workstreams: Vec<PersistedWorkstream>) -> Result<(), String> {
        *locked(&self.workstreams) = workstreams;
        *locked(&self.saves) += 1;
        Ok(())
    }
}

/// One fake of every collaborator, sharing a call log.
pub struct FakeWorld {
    pub log: CallLog,
    pub git: Arc<FakeGit>,
    pub runtime: Arc<FakeRuntime>,
    pub sync: Arc<FakeSync>,
    pub pr_host: Arc<FakePullRequestHost>,
    pub tracker: Arc<MemoryTracker>,
    pub store: Arc<MemoryStore>,
}

impl Default for FakeWorld {
    fn default() -> Self {
        Self::with_store(MemoryStore::default())
    }
}

impl FakeWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let log = CallLog::default();
        Self {
            git: Arc::new(FakeGit::new(log.clone())),
            runtime: Arc::new(FakeRuntime::new(log.clone())),
            sync: Arc::new(FakeSync::new(log.clone())),
            pr_host: Arc::new(FakePullRequestHost::new(log.clone())),
            tracker: Arc::new(MemoryTracker::default()),
            store: Arc::new(store),
            log,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            git: self.git.clone(),
            runtime: self.runtime.clone(),
            sync: self.sync.clone(),
            pr_host: self.pr_host.clone(),
            tracker: self.tracker.clone(),
            store: self.store.clone(),
        }
    }
}
