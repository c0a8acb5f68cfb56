use flotilla_domain::{
    BranchMode, ContainerState, Message, Notice, PersistedWorkstream, PtyStatus, WorkstreamId,
    WorkstreamState,
};
use flotilla_engine::test_support::{FakeWorld, MemoryStore};
use flotilla_engine::{Engine, EngineConfig, EngineEvent, EngineHandle};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(5);

fn config(root: &tempfile::TempDir, headless: bool) -> EngineConfig {
    let repo = root.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    let mut config = EngineConfig::new(repo, root.path().join("flotilla"));
    config.headless = headless;
    config
}

fn persisted(id: &str, state: &str, container_id: Option<&str>) -> PersistedWorkstream {
    PersistedWorkstream {
        id: id.to_owned(),
        prompt: format!("work on {id}"),
        branch_name: format!("branch-{id}"),
        container_id: container_id.map(str::to_owned),
        worktree_path: None,
        state: state.to_owned(),
        pr_url: None,
        pr_number: None,
        pairing_previous_branch: None,
        pairing_stashed_changes: false,
        created_at_unix_ms: 1,
    }
}

async fn idle(engine: &EngineHandle) {
    tokio::time::timeout(WAIT, engine.wait_idle())
        .await
        .expect("engine did not go idle")
        .unwrap();
}

async fn wait_for<T>(
    events: &mut broadcast::Receiver<EngineEvent>,
    mut pick: impl FnMut(EngineEvent) -> Option<T>,
) -> T {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("timed out waiting for engine event");
        match event {
            Ok(event) => {
                if let Some(found) = pick(event) {
                    return found;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => panic!("engine event stream closed"),
        }
    }
}

async fn poll_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn created_workstream_runs_its_agent_until_destroyed() {
    let root = tempfile::tempdir().unwrap();
    let config = config(&root, false);
    let world = FakeWorld::new();
    world
        .runtime
        .set_exec_output(b"Welcome\r\n  Bypass Permissions mode\r\n  1. No, exit\r\n");

    let (engine, events) = Engine::start(world.collaborators(), config.clone());
    let mut events = events.subscribe();
    idle(&engine).await;

    let id = WorkstreamId::from_string("ws-1");
    engine
        .dispatch(Message::CreateWorkstream {
            id: id.clone(),
            prompt: "Fix the login bug".to_owned(),
            branch_name: String::new(),
        })
        .await
        .unwrap();
    idle(&engine).await;

    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.workstreams.len(), 1);
    let ws = &snapshot.workstreams[0];
    assert_eq!(ws.state, WorkstreamState::Running);
    assert_eq!(ws.branch_name, "fix-the-login-bug");
    assert_eq!(ws.container_id.as_deref(), Some("c1"));
    assert_eq!(
        ws.worktree_path,
        Some(config.worktree_root.join("fix-the-login-bug"))
    );
    assert_eq!(ws.pty, PtyStatus::Attached);

    let requests = world.runtime.exec_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].command[2],
        r#"claude --dangerously-skip-permissions "Fix the login bug""#
    );

    let output = wait_for(&mut events, |event| match event {
        EngineEvent::PtyOutput {
            workstream_id,
            bytes,
        } if workstream_id == id => Some(bytes),
        _ => None,
    })
    .await;
    assert!(String::from_utf8_lossy(&output).contains("Bypass Permissions mode"));

    let tap = world.runtime.exec_taps()[0].clone();
    poll_until("the permission prompt to be accepted", || {
        tap.written() == b"\x1b[B\r"
    })
    .await;

    engine.send_input(b"y").unwrap();
    assert_eq!(tap.written(), b"\x1b[B\ry");

    let saved = world.store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].state, "running");

    engine
        .dispatch(Message::DestroyWorkstream {
            workstream_id: id.clone(),
        })
        .await
        .unwrap();
    idle(&engine).await;

    let snapshot = engine.snapshot().await.unwrap();
    assert!(snapshot.workstreams.is_empty());
    assert!(world.runtime.container_ids().is_empty());
    assert!(!world.git.has_branch("fix-the-login-bug"));
    assert!(!config.worktree_root.join("fix-the-login-bug").exists());
    assert_eq!(tap.close_calls(), 1);
    assert!(engine.pty(&id).is_none());
    assert!(world.store.saved().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_closes_the_terminal_and_resume_continues_the_agent() {
    let root = tempfile::tempdir().unwrap();
    let world = FakeWorld::new();
    let (engine, _events) = Engine::start(world.collaborators(), config(&root, false));
    idle(&engine).await;

    let id = WorkstreamId::from_string("ws-1");
    engine
        .dispatch(Message::CreateWorkstream {
            id: id.clone(),
            prompt: "Add caching".to_owned(),
            branch_name: "cache".to_owned(),
        })
        .await
        .unwrap();
    idle(&engine).await;

    engine
        .dispatch(Message::PauseWorkstream {
            workstream_id: id.clone(),
        })
        .await
        .unwrap();
    idle(&engine).await;

    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.workstreams[0].state, WorkstreamState::Paused);
    assert_eq!(snapshot.workstreams[0].pty, PtyStatus::Detached);
    assert_eq!(world.runtime.state_of("c1"), ContainerState::Paused);
    assert_eq!(world.runtime.exec_taps()[0].close_calls(), 1);
    assert!(engine.pty(&id).is_none());

    engine
        .dispatch(Message::ResumeWorkstream {
            workstream_id: id.clone(),
        })
        .await
        .unwrap();
    idle(&engine).await;

    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.workstreams[0].state, WorkstreamState::Running);
    assert_eq!(snapshot.workstreams[0].pty, PtyStatus::Attached);
    let requests = world.runtime.exec_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].command[2],
        "claude --dangerously-skip-permissions --continue"
    );

    engine
        .dispatch(Message::TerminalResized {
            width: 100,
            height: 30,
        })
        .await
        .unwrap();
    let tap = world.runtime.exec_taps()[1].clone();
    poll_until("the terminal to be resized", || {
        tap.resizes() == vec![(100, 30)]
    })
    .await;
}

#[tokio::test]
async fn branch_conflict_waits_for_a_decision() {
    let root = tempfile::tempdir().unwrap();
    let world = FakeWorld::new();
    world.git.add_branch("feature-x", true);
    let (engine, events) = Engine::start(world.collaborators(), config(&root, true));
    let mut events = events.subscribe();
    idle(&engine).await;

    let id = WorkstreamId::from_string("ws-1");
    engine
        .dispatch(Message::CreateWorkstream {
            id: id.clone(),
            prompt: "Build feature x".to_owned(),
            branch_name: "feature-x".to_owned(),
        })
        .await
        .unwrap();
    idle(&engine).await;

    let (branch_name, info) = wait_for(&mut events, |event| match event {
        EngineEvent::Notice {
            notice: Notice::BranchConflict { branch_name, info },
            ..
        } => Some((branch_name, info)),
        _ => None,
    })
    .await;
    assert_eq!(branch_name, "feature-x");
    assert!(!info.is_empty());
    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(
        snapshot.workstreams[0].state,
        WorkstreamState::AwaitingBranchDecision
    );
    assert_eq!(world.log.count_prefix("runtime.create"), 0);

    engine
        .dispatch(Message::ProvisionWorkstream {
            workstream_id: id,
            mode: BranchMode::Uniquify {
                existing_branches: Vec::new(),
            },
        })
        .await
        .unwrap();
    idle(&engine).await;

    let snapshot = engine.snapshot().await.unwrap();
    let ws = &snapshot.workstreams[0];
    assert_eq!(ws.state, WorkstreamState::Running);
    assert_eq!(ws.branch_name, "feature-x-2");
    assert_eq!(ws.pty, PtyStatus::Detached);
    assert!(world.runtime.exec_requests().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_provision_holds_off_retries_and_is_swept_on_destroy() {
    let root = tempfile::tempdir().unwrap();
    let mut config = config(&root, true);
    config.timeouts.create = Duration::from_millis(100);
    let world = FakeWorld::new();
    world.runtime.delay("create", Duration::from_millis(800));
    let (engine, _events) = Engine::start(world.collaborators(), config);
    idle(&engine).await;

    let id = WorkstreamId::from_string("ws-1");
    engine
        .dispatch(Message::CreateWorkstream {
            id: id.clone(),
            prompt: "Build feature x".to_owned(),
            branch_name: "feature-x".to_owned(),
        })
        .await
        .unwrap();
    idle(&engine).await;

    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.workstreams[0].state, WorkstreamState::Failed);
    assert_eq!(snapshot.workstreams[0].container_id, None);

    engine
        .dispatch(Message::ProvisionWorkstream {
            workstream_id: id.clone(),
            mode: BranchMode::UseExisting,
        })
        .await
        .unwrap();
    let snapshot = engine.snapshot().await.unwrap();
    let ws = &snapshot.workstreams[0];
    assert_eq!(ws.state, WorkstreamState::Failed);
    assert_eq!(
        ws.last_error.as_deref(),
        Some("an earlier provision is still running")
    );

    poll_until("the first provision to start its container", || {
        world.tracker.container_ids() == vec!["c1".to_owned()]
    })
    .await;
    assert_eq!(world.log.count_prefix("runtime.create"), 1);

    engine
        .dispatch(Message::DestroyWorkstream { workstream_id: id })
        .await
        .unwrap();
    idle(&engine).await;

    assert!(world.runtime.container_ids().is_empty());
    assert!(world.tracker.container_ids().is_empty());
    assert!(engine.snapshot().await.unwrap().workstreams.is_empty());
}

#[tokio::test]
async fn startup_reconciles_persisted_workstreams_with_the_runtime() {
    let root = tempfile::tempdir().unwrap();
    let world = FakeWorld::with_store(MemoryStore::with_workstreams(vec![
        persisted("ws-1", "running", Some("c1")),
        persisted("ws-2", "provisioning", None),
        persisted("ws-3", "running", Some("c3")),
    ]));
    world
        .runtime
        .insert_container("c1", ContainerState::Paused, Some("ws-1"));
    world
        .runtime
        .insert_container("c4", ContainerState::Running, Some("ws-gone"));
    // Started by the interrupted provision of ws-2 but never saved against it.
    world
        .runtime
        .insert_container("c2", ContainerState::Running, Some("ws-2"));

    let (engine, events) = Engine::start(world.collaborators(), config(&root, true));
    let mut events = events.subscribe();
    idle(&engine).await;

    let snapshot = engine.snapshot().await.unwrap();
    let state_of = |id: &str| {
        snapshot
            .workstreams
            .iter()
            .find(|w| w.id.as_str() == id)
            .map(|w| (w.state, w.container_id.clone()))
            .unwrap()
    };
    assert_eq!(state_of("ws-1"), (WorkstreamState::Paused, Some("c1".to_owned())));
    assert_eq!(state_of("ws-2"), (WorkstreamState::Failed, None));
    assert_eq!(state_of("ws-3"), (WorkstreamState::Stopped, None));
    assert_eq!(world.runtime.container_ids(), vec!["c1".to_owned()]);

    let saved = world.store.saved();
    let ws1 = saved.iter().find(|w| w.id == "ws-1").unwrap();
    assert_eq!(ws1.state, "paused");

    let orphans = wait_for(&mut events, |event| match event {
        EngineEvent::Notice {
            notice: Notice::OrphansRemoved { containers },
            ..
        } => Some(containers),
        _ => None,
    })
    .await;
    assert_eq!(orphans, vec!["c2".to_owned(), "c4".to_owned()]);

    engine.dispatch(Message::RecoverCrashed).await.unwrap();
    idle(&engine).await;
    assert_eq!(world.runtime.container_ids(), vec!["c1".to_owned()]);
}

#[tokio::test]
async fn prune_skips_running_workstreams() {
    let root = tempfile::tempdir().unwrap();
    let world = FakeWorld::with_store(MemoryStore::with_workstreams(vec![
        persisted("ws-1", "paused", Some("c1")),
        persisted("ws-2", "running", Some("c2")),
    ]));
    world
        .runtime
        .insert_container("c1", ContainerState::Paused, Some("ws-1"));
    world
        .runtime
        .insert_container("c2", ContainerState::Running, Some("ws-2"));

    let (engine, events) = Engine::start(world.collaborators(), config(&root, true));
    let mut events = events.subscribe();
    idle(&engine).await;

    engine.dispatch(Message::PruneWorkstreams).await.unwrap();
    idle(&engine).await;

    let (workstreams, containers) = wait_for(&mut events, |event| match event {
        EngineEvent::Notice {
            notice:
                Notice::Pruned {
                    workstreams,
                    containers,
                },
            ..
        } => Some((workstreams, containers)),
        _ => None,
    })
    .await;
    assert_eq!((workstreams, containers), (1, 0));

    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.workstreams.len(), 1);
    assert_eq!(snapshot.workstreams[0].id.as_str(), "ws-2");
    assert_eq!(world.runtime.container_ids(), vec!["c2".to_owned()]);
    assert_eq!(world.store.saved().len(), 1);
}

#[tokio::test]
async fn resuming_without_a_container_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let world = FakeWorld::with_store(MemoryStore::with_workstreams(vec![persisted(
        "ws-1", "paused", None,
    )]));
    let (engine, events) = Engine::start(world.collaborators(), config(&root, true));
    let mut events = events.subscribe();
    idle(&engine).await;

    engine
        .dispatch(Message::ResumeWorkstream {
            workstream_id: WorkstreamId::from_string("ws-1"),
        })
        .await
        .unwrap();

    let message = wait_for(&mut events, |event| match event {
        EngineEvent::Notice {
            notice: Notice::Error { message },
            ..
        } => Some(message),
        _ => None,
    })
    .await;
    assert_eq!(message, "workstream has no container");
    idle(&engine).await;
}
