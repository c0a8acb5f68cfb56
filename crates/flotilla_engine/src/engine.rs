use crate::collaborators::Collaborators;
use crate::command::{Command, execute};
use crate::config::EngineConfig;
use crate::pty::{self, AttachRequest, PtyRegistry, PtySession};
use crate::sagas::{self, WorkstreamSnapshot};
use anyhow::Context as _;
use flotilla_domain::{
    AppState, Effect, Message, Notice, PersistedWorkstream, Workstream, WorkstreamId,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot};

#[derive(Clone, Debug)]
pub enum EngineEvent {
    StateChanged {
        rev: u64,
    },
    PtyOutput {
        workstream_id: WorkstreamId,
        bytes: Vec<u8>,
    },
    Notice {
        workstream_id: Option<WorkstreamId>,
        notice: Notice,
    },
}

#[derive(Clone, Debug)]
pub struct EngineSnapshot {
    pub rev: u64,
    pub workstreams: Vec<Workstream>,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    registry: PtyRegistry,
}

impl EngineHandle {
    /// Feeds `message` to the reducer and returns the revision after it.
    pub async fn dispatch(&self, message: Message) -> anyhow::Result<u64> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Dispatch {
                message,
                reply: reply_tx,
            })
            .await
            .context("engine unavailable")?;
        reply_rx.await.context("engine stopped")
    }

    pub async fn snapshot(&self) -> anyhow::Result<EngineSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Snapshot { reply: reply_tx })
            .await
            .context("engine unavailable")?;
        reply_rx.await.context("engine stopped")
    }

    /// Resolves once no command or save is in flight. PTY streams do not count.
    pub async fn wait_idle(&self) -> anyhow::Result<u64> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::WaitIdle { reply: reply_tx })
            .await
            .context("engine unavailable")?;
        reply_rx.await.context("engine stopped")
    }

    pub fn pty(&self, workstream_id: &WorkstreamId) -> Option<Arc<PtySession>> {
        self.registry.get(workstream_id)
    }

    /// Makes `workstream_id` the target of [`EngineHandle::send_input`].
    pub fn focus(&self, workstream_id: &WorkstreamId) -> anyhow::Result<()> {
        self.registry.focus(workstream_id)
    }

    pub fn send_input(&self, bytes: &[u8]) -> anyhow::Result<()> {
        self.registry.send(bytes)
    }
}

/// Workstreams whose provisioning work is still on the blocking pool. Outlives
/// the command, which may already have timed out.
#[derive(Clone, Default)]
struct ProvisionLocks(Arc<Mutex<HashSet<WorkstreamId>>>);

impl ProvisionLocks {
    fn acquire(&self, workstream_id: &WorkstreamId) -> Option<ProvisionLock> {
        let mut held = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        held.insert(workstream_id.clone()).then(|| ProvisionLock {
            locks: self.clone(),
            workstream_id: workstream_id.clone(),
        })
    }
}

struct ProvisionLock {
    locks: ProvisionLocks,
    workstream_id: WorkstreamId,
}

impl Drop for ProvisionLock {
    fn drop(&mut self) {
        self.locks
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.workstream_id);
    }
}

enum EngineCommand {
    Dispatch {
        message: Message,
        reply: oneshot::Sender<u64>,
    },
    Snapshot {
        reply: oneshot::Sender<EngineSnapshot>,
    },
    WaitIdle {
        reply: oneshot::Sender<u64>,
    },
}

pub struct Engine {
    state: AppState,
    rev: u64,
    deps: Collaborators,
    config: Arc<EngineConfig>,
    events: broadcast::Sender<EngineEvent>,
    results: mpsc::UnboundedSender<Message>,
    stream: mpsc::UnboundedSender<Message>,
    saves: mpsc::UnboundedSender<Vec<PersistedWorkstream>>,
    registry: PtyRegistry,
    provisions: ProvisionLocks,
    in_flight: usize,
    idle_waiters: Vec<oneshot::Sender<u64>>,
}

impl Engine {
    pub fn start(
        deps: Collaborators,
        config: EngineConfig,
    ) -> (EngineHandle, broadcast::Sender<EngineEvent>) {
        let (tx, mut rx) = mpsc::channel::<EngineCommand>(256);
        let (events, _) = broadcast::channel::<EngineEvent>(256);
        let (results, mut results_rx) = mpsc::unbounded_channel::<Message>();
        let (stream, mut stream_rx) = mpsc::unbounded_channel::<Message>();
        let (saves, saves_rx) = mpsc::unbounded_channel::<Vec<PersistedWorkstream>>();
        let registry = PtyRegistry::new();

        spawn_saver(deps.clone(), saves_rx, results.clone());

        let mut engine = Self {
            state: AppState::new(),
            rev: 0,
            deps,
            config: Arc::new(config),
            events: events.clone(),
            results,
            stream,
            saves,
            registry: registry.clone(),
            provisions: ProvisionLocks::default(),
            in_flight: 0,
            idle_waiters: Vec::new(),
        };

        tokio::spawn(async move {
            engine.process(Message::AppStarted);
            loop {
                tokio::select! {
                    cmd = rx.recv() => match cmd {
                        Some(cmd) => engine.handle(cmd),
                        None => break,
                    },
                    Some(message) = results_rx.recv() => {
                        engine.in_flight = engine.in_flight.saturating_sub(1);
                        engine.process(message);
                    }
                    Some(message) = stream_rx.recv() => engine.process(message),
                }
                engine.notify_idle();
            }
            engine.shutdown();
        });

        (EngineHandle { tx, registry }, events)
    }

    fn handle(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Dispatch { message, reply } => {
                self.process(message);
                let _ = reply.send(self.rev);
            }
            EngineCommand::Snapshot { reply } => {
                let _ = reply.send(EngineSnapshot {
                    rev: self.rev,
                    workstreams: self.state.workstreams.clone(),
                    last_error: self.state.last_error.clone(),
                });
            }
            EngineCommand::WaitIdle { reply } => self.idle_waiters.push(reply),
        }
    }

    fn notify_idle(&mut self) {
        if self.in_flight > 0 {
            return;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(self.rev);
        }
    }

    fn process(&mut self, message: Message) {
        let quiet = matches!(message, Message::PtyOutput { .. });
        if let Message::PtyClosed { workstream_id, .. } = &message {
            self.registry.remove_if_closed(workstream_id);
        }

        let effects = self.state.apply(message);
        if !quiet {
            self.rev = self.rev.saturating_add(1);
            let _ = self.events.send(EngineEvent::StateChanged { rev: self.rev });
        }

        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn spawn(&mut self, command: Command) {
        self.in_flight += 1;
        execute(command, self.results.clone());
    }

    fn snapshot_of(&self, workstream_id: &WorkstreamId) -> Option<WorkstreamSnapshot> {
        self.state.workstream(workstream_id).map(WorkstreamSnapshot::from)
    }

    fn run_effect(&mut self, effect: Effect) {
        let timeouts = self.config.timeouts;
        match effect {
            Effect::LoadState => {
                let store = self.deps.store.clone();
                self.spawn(Command::new(
                    "load state",
                    timeouts.stop,
                    move || match store.load_workstreams() {
                        Ok(workstreams) => Message::StateLoaded { workstreams },
                        Err(message) => Message::StateLoadFailed { message },
                    },
                    |message| Message::StateLoadFailed { message },
                ));
            }
            Effect::SaveState => {
                self.in_flight += 1;
                if self.saves.send(self.state.to_persisted()).is_err() {
                    self.in_flight -= 1;
                    tracing::error!("state saver stopped");
                }
            }
            Effect::Provision {
                workstream_id,
                mode,
            } => {
                let Some(snapshot) = self.snapshot_of(&workstream_id) else {
                    return;
                };
                let Some(lock) = self.provisions.acquire(&workstream_id) else {
                    tracing::warn!(workstream_id = %workstream_id, "provision requested while an earlier one is still running");
                    self.process(Message::ProvisionFailed {
                        workstream_id,
                        message: "an earlier provision is still running".to_owned(),
                    });
                    return;
                };
                let deps = self.deps.clone();
                let config = self.config.clone();
                self.spawn(Command::new(
                    "provision",
                    timeouts.create,
                    move || {
                        let _lock = lock;
                        sagas::provision(&deps, &config, &snapshot, mode)
                    },
                    move |message| Message::ProvisionFailed {
                        workstream_id,
                        message,
                    },
                ));
            }
            Effect::AttachPty {
                workstream_id,
                resume,
                width,
                height,
            } => {
                if self.config.headless {
                    self.process(Message::DetachPty { workstream_id });
                    return;
                }
                let Some(workstream) = self.state.workstream(&workstream_id) else {
                    return;
                };
                let Some(container_id) = workstream.container_id.clone() else {
                    self.process(Message::PtyAttachFailed {
                        workstream_id,
                        message: "workstream has no container".to_owned(),
                    });
                    return;
                };
                let request = AttachRequest {
                    workstream_id: workstream_id.clone(),
                    container_id,
                    prompt: workstream.prompt.clone(),
                    resume,
                    width,
                    height,
                    agent_cmd: self.config.agent_cmd.clone(),
                    extra_env: self.config.credentials.clone(),
                };
                let runtime = self.deps.runtime.clone();
                let registry = self.registry.clone();
                let stream = self.stream.clone();
                let handle = tokio::runtime::Handle::current();
                self.spawn(Command::new(
                    "attach pty",
                    timeouts.create,
                    move || pty::attach(runtime.as_ref(), &registry, request, stream, &handle),
                    move |message| Message::PtyAttachFailed {
                        workstream_id,
                        message,
                    },
                ));
            }
            Effect::ForwardPtyOutput {
                workstream_id,
                bytes,
            } => {
                let _ = self.events.send(EngineEvent::PtyOutput {
                    workstream_id,
                    bytes,
                });
            }
            Effect::ClosePty { workstream_id } => {
                if let Some(session) = self.registry.remove(&workstream_id) {
                    tokio::task::spawn_blocking(move || session.close());
                }
            }
            Effect::ResizePtys { width, height } => {
                for session in self.registry.sessions() {
                    tokio::task::spawn_blocking(move || {
                        if let Err(err) = session.resize(width, height) {
                            tracing::warn!(
                                workstream_id = %session.workstream_id(),
                                error = %format!("{err:#}"),
                                "pty resize failed"
                            );
                        }
                    });
                }
            }
            Effect::Pause { workstream_id } => {
                let Some(snapshot) = self.snapshot_of(&workstream_id) else {
                    return;
                };
                let deps = self.deps.clone();
                let registry = self.registry.clone();
                self.spawn(Command::new(
                    "pause",
                    timeouts.stop,
                    move || {
                        close_pty(&registry, &snapshot.id);
                        sagas::pause(&deps, &snapshot)
                    },
                    move |message| Message::PauseFailed {
                        workstream_id,
                        message,
                    },
                ));
            }
            Effect::Resume { workstream_id } => {
                let Some(snapshot) = self.snapshot_of(&workstream_id) else {
                    return;
                };
                let deps = self.deps.clone();
                self.spawn(Command::new(
                    "resume",
                    timeouts.create,
                    move || sagas::resume(&deps, &snapshot),
                    move |message| Message::ResumeFailed {
                        workstream_id,
                        message,
                    },
                ));
            }
            Effect::Teardown { workstream_id } => {
                let Some(snapshot) = self.snapshot_of(&workstream_id) else {
                    return;
                };
                let deps = self.deps.clone();
                let config = self.config.clone();
                let registry = self.registry.clone();
                self.spawn(Command::new(
                    "teardown",
                    timeouts.stop,
                    move || {
                        close_pty(&registry, &snapshot.id);
                        sagas::teardown(&deps, &config, &snapshot)
                    },
                    move |message| Message::WorkstreamStopped {
                        workstream_id,
                        branch_deleted: false,
                        stashed_changes: false,
                        warnings: vec![message],
                    },
                ));
            }
            Effect::CreatePullRequest { workstream_id } => {
                let Some(snapshot) = self.snapshot_of(&workstream_id) else {
                    return;
                };
                let deps = self.deps.clone();
                self.spawn(Command::new(
                    "create pull request",
                    timeouts.pull_request,
                    move || sagas::create_pull_request(&deps, &snapshot),
                    move |message| Message::PullRequestFailed {
                        workstream_id,
                        message,
                    },
                ));
            }
            Effect::Merge {
                workstream_id,
                commit_first,
            } => {
                let Some(snapshot) = self.snapshot_of(&workstream_id) else {
                    return;
                };
                let deps = self.deps.clone();
                let config = self.config.clone();
                self.spawn(Command::new(
                    "merge",
                    timeouts.create,
                    move || sagas::merge(&deps, &config, &snapshot, commit_first),
                    move |message| Message::MergeFailed {
                        workstream_id,
                        message,
                    },
                ));
            }
            Effect::EnablePairing { workstream_id } => {
                let Some(snapshot) = self.snapshot_of(&workstream_id) else {
                    return;
                };
                let deps = self.deps.clone();
                let config = self.config.clone();
                self.spawn(Command::new(
                    "enable pairing",
                    timeouts.create,
                    move || sagas::enable_pairing(&deps, &config, &snapshot),
                    move |message| Message::PairingEnableFailed {
                        workstream_id,
                        message,
                        stashed_changes: false,
                    },
                ));
            }
            Effect::DisablePairing { workstream_id } => {
                let Some(snapshot) = self.snapshot_of(&workstream_id) else {
                    return;
                };
                let deps = self.deps.clone();
                let config = self.config.clone();
                self.spawn(Command::new(
                    "disable pairing",
                    timeouts.stop,
                    move || sagas::disable_pairing(&deps, &config, &snapshot),
                    move |message| Message::PairingDisableFailed {
                        workstream_id,
                        message,
                    },
                ));
            }
            Effect::FetchLogs { workstream_id } => {
                let Some(snapshot) = self.snapshot_of(&workstream_id) else {
                    return;
                };
                let deps = self.deps.clone();
                self.spawn(Command::new(
                    "fetch logs",
                    timeouts.logs,
                    move || sagas::fetch_logs(&deps, &snapshot),
                    move |message| Message::LogsFetchFailed {
                        workstream_id,
                        message,
                    },
                ));
            }
            Effect::Prune { workstream_ids } => {
                let snapshots = workstream_ids
                    .iter()
                    .filter_map(|id| self.snapshot_of(id))
                    .collect::<Vec<_>>();
                let deps = self.deps.clone();
                let config = self.config.clone();
                let registry = self.registry.clone();
                self.spawn(Command::new(
                    "prune",
                    timeouts.stop,
                    move || {
                        for snapshot in &snapshots {
                            close_pty(&registry, &snapshot.id);
                        }
                        sagas::prune(&deps, &config, &snapshots)
                    },
                    move |message| {
                        tracing::warn!(error = %message, "prune did not finish");
                        Message::Pruned {
                            workstream_ids,
                            containers_removed: 0,
                        }
                    },
                ));
            }
            Effect::RecoverCrashed { known_workstreams } => {
                let known = known_workstreams
                    .iter()
                    .filter_map(|id| self.snapshot_of(id))
                    .collect::<Vec<_>>();
                let deps = self.deps.clone();
                self.spawn(Command::new(
                    "crash recovery",
                    timeouts.stop,
                    move || sagas::recover_crashed(&deps, &known),
                    |message| {
                        tracing::warn!(error = %message, "crash recovery did not finish");
                        Message::CrashRecoveryCompleted {
                            orphans_removed: Vec::new(),
                            observed: Vec::new(),
                        }
                    },
                ));
            }
            Effect::Notify {
                workstream_id,
                notice,
            } => {
                match &notice {
                    Notice::Error { message } => match &workstream_id {
                        Some(id) => tracing::warn!(workstream_id = %id, error = %message, "workstream error"),
                        None => tracing::warn!(error = %message, "engine error"),
                    },
                    other => tracing::debug!(notice = ?other, "notice"),
                }
                let _ = self.events.send(EngineEvent::Notice {
                    workstream_id,
                    notice,
                });
            }
        }
    }

    fn shutdown(&mut self) {
        let sessions = self.registry.drain();
        if sessions.is_empty() {
            return;
        }
        tracing::info!(count = sessions.len(), "closing pty sessions");
        tokio::task::spawn_blocking(move || {
            for session in sessions {
                session.close();
            }
        });
    }
}

fn close_pty(registry: &PtyRegistry, workstream_id: &WorkstreamId) {
    if let Some(session) = registry.remove(workstream_id) {
        session.close();
    }
}

/// Writes snapshots one at a time, in the order they were taken.
fn spawn_saver(
    deps: Collaborators,
    mut saves: mpsc::UnboundedReceiver<Vec<PersistedWorkstream>>,
    results: mpsc::UnboundedSender<Message>,
) {
    tokio::spawn(async move {
        while let Some(snapshot) = saves.recv().await {
            let store = deps.store.clone();
            let saved = tokio::task::spawn_blocking(move || store.save_workstreams(snapshot))
                .await
                .ok()
                .unwrap_or_else(|| Err("failed to join save task".to_owned()));
            let message = match saved {
                Ok(()) => Message::StateSaved,
                Err(message) => Message::StateSaveFailed { message },
            };
            if results.send(message).is_err() {
                break;
            }
        }
    });
}
