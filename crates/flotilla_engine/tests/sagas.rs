use flotilla_domain::{
    BranchMode, ContainerState, CrashRecoveryRecord, CrashTracker as _, GitClient as _, Message,
    ObservedContainer, Pairing, WorkstreamId,
};
use flotilla_engine::EngineConfig;
use flotilla_engine::sagas::{self, WorkstreamSnapshot};
use flotilla_engine::test_support::FakeWorld;
use std::path::PathBuf;
use tempfile::TempDir;

struct Fixture {
    world: FakeWorld,
    config: EngineConfig,
    _root: TempDir,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let repo = root.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    let config = EngineConfig::new(repo, root.path().join("flotilla"));
    Fixture {
        world: FakeWorld::new(),
        config,
        _root: root,
    }
}

fn snapshot(id: &str, branch: &str) -> WorkstreamSnapshot {
    WorkstreamSnapshot {
        id: WorkstreamId::from_string(id),
        prompt: "Fix the login bug".to_owned(),
        branch_name: branch.to_owned(),
        container_id: None,
        worktree_path: None,
        pairing: None,
        in_flight: false,
    }
}

/// Provisions `branch` and returns the snapshot of the running workstream.
fn running(f: &Fixture, id: &str, branch: &str) -> WorkstreamSnapshot {
    let mut ws = snapshot(id, branch);
    match sagas::provision(&f.world.collaborators(), &f.config, &ws, BranchMode::New) {
        Message::WorkstreamStarted {
            container_id,
            worktree_path,
            ..
        } => {
            ws.container_id = Some(container_id);
            ws.worktree_path = Some(worktree_path);
        }
        other => panic!("unexpected provision result: {other:?}"),
    }
    ws
}

#[test]
fn existing_branch_is_a_conflict_and_touches_nothing() {
    let f = fixture();
    f.world.git.add_branch("feature-x", true);

    let result = sagas::provision(
        &f.world.collaborators(),
        &f.config,
        &snapshot("ws-1", "feature-x"),
        BranchMode::New,
    );

    match result {
        Message::BranchConflict {
            branch_name, info, ..
        } => {
            assert_eq!(branch_name, "feature-x");
            assert!(info.contains("feature-x"));
        }
        other => panic!("expected a branch conflict, got {other:?}"),
    }
    assert_eq!(f.world.log.count_prefix("runtime."), 0);
    assert_eq!(f.world.log.count_prefix("git.create_worktree"), 0);
    assert!(!f.config.worktree_root.join("feature-x").exists());
}

#[test]
fn provisioning_creates_worktree_container_and_crash_record() {
    let f = fixture();

    let result = sagas::provision(
        &f.world.collaborators(),
        &f.config,
        &snapshot("ws-1", "feature-x"),
        BranchMode::New,
    );

    let Message::WorkstreamStarted {
        container_id,
        branch_name,
        worktree_path,
        ..
    } = result
    else {
        panic!("expected the workstream to start, got {result:?}");
    };
    assert_eq!(container_id, "c1");
    assert_eq!(branch_name, "feature-x");
    assert_eq!(worktree_path, f.config.worktree_root.join("feature-x"));
    assert!(worktree_path.is_dir());
    assert!(
        f.config
            .containers_root
            .join("ws-1")
            .join("agent-config")
            .is_dir()
    );
    assert_eq!(f.world.runtime.state_of("c1"), ContainerState::Running);
    assert_eq!(f.world.tracker.container_ids(), vec!["c1".to_owned()]);

    let configs = f.world.runtime.created_configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].workspace.source, worktree_path);
    assert_eq!(configs[0].git_dir.source, f.config.repo.join(".git"));
}

#[test]
fn uniquify_skips_taken_names() {
    let f = fixture();
    f.world.git.add_branch("f", false);
    f.world.git.add_branch("f-2", false);

    let result = sagas::provision(
        &f.world.collaborators(),
        &f.config,
        &snapshot("ws-1", "f"),
        BranchMode::Uniquify {
            existing_branches: Vec::new(),
        },
    );
    match result {
        Message::WorkstreamStarted {
            branch_name,
            worktree_path,
            ..
        } => {
            assert_eq!(branch_name, "f-3");
            assert_eq!(worktree_path, f.config.worktree_root.join("f-3"));
        }
        other => panic!("unexpected provision result: {other:?}"),
    }

    let result = sagas::provision(
        &f.world.collaborators(),
        &f.config,
        &snapshot("ws-2", "f"),
        BranchMode::Uniquify {
            existing_branches: vec!["f-4".to_owned()],
        },
    );
    match result {
        Message::WorkstreamStarted { branch_name, .. } => assert_eq!(branch_name, "f-5"),
        other => panic!("unexpected provision result: {other:?}"),
    }
}

#[test]
fn recreate_discards_the_old_branch_and_worktree() {
    let f = fixture();
    f.world.git.add_branch("feature-x", true);
    let old_path = f.config.worktree_root.join("old-checkout");
    f.world
        .git
        .create_worktree_from_existing(&f.config.repo, &old_path, "feature-x")
        .unwrap();

    let result = sagas::provision(
        &f.world.collaborators(),
        &f.config,
        &snapshot("ws-1", "feature-x"),
        BranchMode::Recreate,
    );

    assert!(matches!(result, Message::WorkstreamStarted { .. }), "{result:?}");
    assert!(!old_path.exists());
    assert!(f.world.log.contains("git.delete_branch feature-x"));
    assert!(
        !f.world
            .git
            .branch_has_commits(&f.config.repo, "feature-x")
            .unwrap()
    );
}

#[test]
fn use_existing_checks_out_the_branch() {
    let f = fixture();
    f.world.git.add_branch("feature-x", true);

    let result = sagas::provision(
        &f.world.collaborators(),
        &f.config,
        &snapshot("ws-1", "feature-x"),
        BranchMode::UseExisting,
    );

    assert!(matches!(result, Message::WorkstreamStarted { .. }), "{result:?}");
    assert!(
        f.world
            .log
            .contains("git.create_worktree_from_existing feature-x")
    );
    assert!(
        f.world
            .git
            .branch_has_commits(&f.config.repo, "feature-x")
            .unwrap()
    );
}

#[test]
fn start_failure_rolls_back_in_reverse_order() {
    let f = fixture();
    f.world.runtime.fail("start");

    let result = sagas::provision(
        &f.world.collaborators(),
        &f.config,
        &snapshot("ws-1", "feature-x"),
        BranchMode::New,
    );

    let Message::ProvisionFailed { message, .. } = result else {
        panic!("expected provisioning to fail, got {result:?}");
    };
    assert!(message.contains("failed to start container c1"), "{message}");
    assert!(message.contains("start failed"), "{message}");

    let worktree = f.config.worktree_root.join("feature-x");
    assert!(f.world.runtime.container_ids().is_empty());
    assert!(f.world.git.worktrees().is_empty());
    assert!(!worktree.exists());
    assert!(!f.config.containers_root.join("ws-1").exists());
    assert!(f.world.tracker.container_ids().is_empty());

    let calls = f.world.log.calls();
    let started = f.world.log.position("runtime.start c1").unwrap();
    let removed = f.world.log.position("runtime.remove c1").unwrap();
    let unregistered = calls
        .iter()
        .rposition(|c| c == &format!("git.remove_worktree {}", worktree.display()))
        .unwrap();
    assert!(started < removed);
    assert!(removed < unregistered);
}

#[test]
fn empty_branch_name_fails_without_side_effects() {
    let f = fixture();

    let result = sagas::provision(
        &f.world.collaborators(),
        &f.config,
        &snapshot("ws-1", "  "),
        BranchMode::New,
    );

    assert!(matches!(result, Message::ProvisionFailed { .. }), "{result:?}");
    assert!(f.world.log.calls().is_empty());
}

#[test]
fn teardown_removes_everything_and_is_idempotent() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");
    let deps = f.world.collaborators();

    match sagas::teardown(&deps, &f.config, &ws) {
        Message::WorkstreamStopped {
            branch_deleted,
            warnings,
            ..
        } => {
            assert!(branch_deleted);
            assert!(warnings.is_empty(), "{warnings:?}");
        }
        other => panic!("unexpected teardown result: {other:?}"),
    }
    assert!(f.world.runtime.container_ids().is_empty());
    assert!(f.world.tracker.container_ids().is_empty());
    assert!(!f.world.git.has_branch("feature-x"));
    assert!(!f.config.worktree_root.join("feature-x").exists());
    assert!(!f.config.containers_root.join("ws-1").exists());

    match sagas::teardown(&deps, &f.config, &ws) {
        Message::WorkstreamStopped {
            branch_deleted,
            warnings,
            ..
        } => {
            assert!(!branch_deleted);
            assert!(warnings.is_empty(), "{warnings:?}");
        }
        other => panic!("unexpected teardown result: {other:?}"),
    }
}

#[test]
fn teardown_removes_containers_the_workstream_never_recorded() {
    let f = fixture();
    let mut ws = running(&f, "ws-1", "feature-x");
    ws.container_id = None;

    let result = sagas::teardown(&f.world.collaborators(), &f.config, &ws);

    match result {
        Message::WorkstreamStopped { warnings, .. } => assert!(warnings.is_empty(), "{warnings:?}"),
        other => panic!("unexpected teardown result: {other:?}"),
    }
    assert!(f.world.runtime.container_ids().is_empty());
    assert!(f.world.tracker.container_ids().is_empty());
}

#[test]
fn teardown_sweeps_leftovers_of_an_earlier_provision() {
    let f = fixture();
    f.world
        .runtime
        .insert_container("c9", ContainerState::Running, Some("ws-1"));
    let ws = running(&f, "ws-1", "feature-x");
    f.world
        .runtime
        .insert_container("c10", ContainerState::Running, Some("ws-2"));

    sagas::teardown(&f.world.collaborators(), &f.config, &ws);

    assert_eq!(f.world.runtime.container_ids(), vec!["c10".to_owned()]);
    assert!(f.world.tracker.container_ids().is_empty());
}

#[test]
fn teardown_of_a_paired_workstream_hands_the_checkout_back() {
    let f = fixture();
    let mut ws = running(&f, "ws-1", "feature-x");
    f.world.git.set_repo_dirty(true);
    let deps = f.world.collaborators();
    let Message::PairingEnabled {
        previous_branch,
        stashed_changes,
        ..
    } = sagas::enable_pairing(&deps, &f.config, &ws)
    else {
        panic!("pairing should enable");
    };
    ws.pairing = Some(Pairing {
        previous_branch,
        stashed_changes,
    });

    let result = sagas::teardown(&deps, &f.config, &ws);

    let Message::WorkstreamStopped {
        branch_deleted,
        stashed_changes,
        warnings,
        ..
    } = result
    else {
        panic!("expected a stopped report, got {result:?}");
    };
    assert!(warnings.is_empty(), "{warnings:?}");
    assert!(branch_deleted);
    assert!(stashed_changes);
    assert!(f.world.sync.sessions().is_empty());
    assert_eq!(f.world.git.current(), "main");
    assert_eq!(f.world.git.stashes(), 1);
    let terminated = f.world.log.position("sync.terminate feature-x").unwrap();
    let restored = f.world.log.position("git.checkout main").unwrap();
    let deleted = f.world.log.position("git.delete_branch feature-x").unwrap();
    assert!(terminated < restored && restored < deleted);
}

#[test]
fn teardown_keeps_branches_with_commits() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");
    let worktree = ws.worktree_path.clone().unwrap();
    f.world.git.commit_all(&worktree, "wip").unwrap();

    let result = sagas::teardown(&f.world.collaborators(), &f.config, &ws);

    assert!(
        matches!(
            result,
            Message::WorkstreamStopped {
                branch_deleted: false,
                ..
            }
        ),
        "{result:?}"
    );
    assert!(f.world.git.has_branch("feature-x"));
    assert!(!worktree.exists());
}

#[test]
fn teardown_reports_failures_as_warnings_and_keeps_going() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");
    f.world.runtime.fail("stop");
    f.world.runtime.fail("remove");

    let result = sagas::teardown(&f.world.collaborators(), &f.config, &ws);

    let Message::WorkstreamStopped {
        branch_deleted,
        warnings,
        ..
    } = result
    else {
        panic!("expected a stopped report, got {result:?}");
    };
    assert_eq!(
        warnings,
        vec![
            "stop container: stop failed".to_owned(),
            "remove container: remove failed".to_owned(),
        ]
    );
    assert!(branch_deleted);
    assert!(!f.config.worktree_root.join("feature-x").exists());
}

#[test]
fn teardown_without_worktree_path_derives_it_from_the_branch() {
    let f = fixture();
    let mut ws = running(&f, "ws-1", "feature-x");
    ws.worktree_path = None;

    sagas::teardown(&f.world.collaborators(), &f.config, &ws);

    assert!(!f.config.worktree_root.join("feature-x").exists());
    assert!(f.world.git.worktrees().is_empty());
}

#[test]
fn pairing_stashes_local_changes_and_checks_out_the_branch() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");
    f.world.git.set_repo_dirty(true);

    let result = sagas::enable_pairing(&f.world.collaborators(), &f.config, &ws);

    match result {
        Message::PairingEnabled {
            previous_branch,
            stashed_changes,
            ..
        } => {
            assert_eq!(previous_branch, "main");
            assert!(stashed_changes);
        }
        other => panic!("unexpected pairing result: {other:?}"),
    }
    assert_eq!(f.world.git.current(), "feature-x");
    assert_eq!(f.world.git.stashes(), 1);
    assert_eq!(f.world.sync.sessions(), vec!["feature-x".to_owned()]);
}

#[test]
fn clean_checkout_is_not_stashed() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");

    let result = sagas::enable_pairing(&f.world.collaborators(), &f.config, &ws);

    assert!(
        matches!(
            result,
            Message::PairingEnabled {
                stashed_changes: false,
                ..
            }
        ),
        "{result:?}"
    );
    assert_eq!(f.world.log.count_prefix("git.stash"), 0);
}

#[test]
fn sync_failure_pops_the_stash() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");
    f.world.git.set_repo_dirty(true);
    f.world.sync.fail("create");

    let result = sagas::enable_pairing(&f.world.collaborators(), &f.config, &ws);

    match result {
        Message::PairingEnableFailed {
            message,
            stashed_changes,
            ..
        } => {
            assert!(stashed_changes);
            assert!(message.contains("failed to start sync for feature-x"), "{message}");
        }
        other => panic!("unexpected pairing result: {other:?}"),
    }
    let log = &f.world.log;
    let stash = log.position("git.stash").unwrap();
    let sync = log.position("sync.create feature-x").unwrap();
    let pop = log.position("git.stash_pop").unwrap();
    assert!(stash < sync && sync < pop);
    assert_eq!(f.world.git.stashes(), 0);
    assert_eq!(f.world.git.current(), "main");
    assert!(!log.contains("git.checkout feature-x"));
}

#[test]
fn checkout_failure_undoes_sync_then_stash() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");
    f.world.git.set_repo_dirty(true);
    f.world.git.fail("checkout");

    let result = sagas::enable_pairing(&f.world.collaborators(), &f.config, &ws);

    assert!(matches!(result, Message::PairingEnableFailed { .. }), "{result:?}");
    let log = &f.world.log;
    let terminated = log.position("sync.terminate feature-x").unwrap();
    let popped = log.position("git.stash_pop").unwrap();
    assert!(terminated < popped);
    assert!(f.world.sync.sessions().is_empty());
    assert_eq!(f.world.git.stashes(), 0);
}

#[test]
fn disabling_pairing_restores_the_previous_branch() {
    let f = fixture();
    let mut ws = running(&f, "ws-1", "feature-x");
    f.world.git.set_repo_dirty(true);
    let deps = f.world.collaborators();
    let Message::PairingEnabled {
        previous_branch,
        stashed_changes,
        ..
    } = sagas::enable_pairing(&deps, &f.config, &ws)
    else {
        panic!("pairing should enable");
    };
    ws.pairing = Some(Pairing {
        previous_branch,
        stashed_changes,
    });

    let result = sagas::disable_pairing(&deps, &f.config, &ws);

    assert!(
        matches!(
            result,
            Message::PairingDisabled {
                stashed_changes: true,
                ..
            }
        ),
        "{result:?}"
    );
    assert_eq!(f.world.git.current(), "main");
    assert!(f.world.sync.sessions().is_empty());
    // The stash stays for the user to pop.
    assert_eq!(f.world.git.stashes(), 1);
}

#[test]
fn pause_and_resume_round_trip() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");
    let deps = f.world.collaborators();

    assert!(matches!(
        sagas::pause(&deps, &ws),
        Message::WorkstreamPaused { .. }
    ));
    assert_eq!(f.world.runtime.state_of("c1"), ContainerState::Paused);

    assert!(matches!(
        sagas::resume(&deps, &ws),
        Message::WorkstreamResumed { .. }
    ));
    assert_eq!(f.world.runtime.state_of("c1"), ContainerState::Running);
    assert_eq!(f.world.tracker.container_ids(), vec!["c1".to_owned()]);
}

#[test]
fn resuming_an_exited_container_fails_without_unpausing() {
    let f = fixture();
    f.world
        .runtime
        .insert_container("c9", ContainerState::Exited, Some("ws-1"));
    let mut ws = snapshot("ws-1", "feature-x");
    ws.container_id = Some("c9".to_owned());

    let result = sagas::resume(&f.world.collaborators(), &ws);

    let Message::ResumeFailed { message, .. } = result else {
        panic!("expected resume to fail, got {result:?}");
    };
    assert!(message.contains("cannot be resumed"), "{message}");
    assert_eq!(f.world.log.count_prefix("runtime.unpause"), 0);
}

#[test]
fn logs_are_empty_without_a_container() {
    let f = fixture();
    let deps = f.world.collaborators();

    match sagas::fetch_logs(&deps, &snapshot("ws-1", "feature-x")) {
        Message::LogsFetched { logs, .. } => assert!(logs.is_empty()),
        other => panic!("unexpected logs result: {other:?}"),
    }

    let ws = running(&f, "ws-2", "feature-y");
    match sagas::fetch_logs(&deps, &ws) {
        Message::LogsFetched { logs, .. } => {
            assert_eq!(logs, format!("last {} lines of c1", sagas::LOG_TAIL_LINES));
        }
        other => panic!("unexpected logs result: {other:?}"),
    }
}

#[test]
fn pull_request_pushes_then_opens() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");

    let result = sagas::create_pull_request(&f.world.collaborators(), &ws);

    match result {
        Message::PullRequestCreated { url, number, .. } => {
            assert_eq!(url, "https://github.com/acme/app/pull/1");
            assert_eq!(number, 1);
        }
        other => panic!("unexpected pull request result: {other:?}"),
    }
    let pushed = f.world.log.position("git.push feature-x").unwrap();
    let opened = f.world.log.position("pr.create").unwrap();
    assert!(pushed < opened);
    assert_eq!(f.world.pr_host.drafts()[0].title, "Fix the login bug");
}

#[test]
fn failed_push_never_opens_a_pull_request() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");
    f.world.git.fail("push");

    let result = sagas::create_pull_request(&f.world.collaborators(), &ws);

    assert!(matches!(result, Message::PullRequestFailed { .. }), "{result:?}");
    assert!(!f.world.log.contains("pr.create"));
}

#[test]
fn dirty_merge_asks_before_committing() {
    let f = fixture();
    let ws = running(&f, "ws-1", "feature-x");
    let worktree = ws.worktree_path.clone().unwrap();
    f.world.git.set_worktree_dirty(&worktree);
    let deps = f.world.collaborators();

    let result = sagas::merge(&deps, &f.config, &ws, false);
    assert!(matches!(result, Message::MergeNeedsCommit { .. }), "{result:?}");
    assert!(!f.world.log.contains("git.commit_all"));
    assert!(!f.world.log.contains("git.merge_into_main feature-x"));

    let result = sagas::merge(&deps, &f.config, &ws, true);
    assert!(
        matches!(result, Message::Merged { committed: true, .. }),
        "{result:?}"
    );
    let committed = f.world.log.position("git.commit_all").unwrap();
    let merged = f.world.log.position("git.merge_into_main feature-x").unwrap();
    assert!(committed < merged);
}

#[test]
fn crash_recovery_removes_orphans_and_observes_known_containers() {
    let f = fixture();
    let runtime = &f.world.runtime;
    runtime.insert_container("c1", ContainerState::Paused, Some("ws-1"));
    runtime.insert_container("c7", ContainerState::Running, Some("ws-gone"));
    runtime.insert_container("c8", ContainerState::Exited, Some("ws-lost"));
    for (container_id, workstream_id) in [("c2", "ws-2"), ("c7", "ws-gone")] {
        f.world
            .tracker
            .track(&CrashRecoveryRecord {
                container_id: container_id.to_owned(),
                workstream_id: workstream_id.to_owned(),
                branch_name: "b".to_owned(),
                path: PathBuf::from("/tmp/b"),
            })
            .unwrap();
    }

    let mut ws1 = snapshot("ws-1", "one");
    ws1.container_id = Some("c1".to_owned());
    let mut ws2 = snapshot("ws-2", "two");
    ws2.container_id = Some("c2".to_owned());
    let ws3 = snapshot("ws-3", "three");

    let result = sagas::recover_crashed(&f.world.collaborators(), &[ws1, ws2, ws3]);

    let Message::CrashRecoveryCompleted {
        orphans_removed,
        observed,
    } = result
    else {
        panic!("expected a recovery report, got {result:?}");
    };
    assert_eq!(orphans_removed, vec!["c7".to_owned(), "c8".to_owned()]);
    assert_eq!(
        observed,
        vec![
            ObservedContainer {
                workstream_id: WorkstreamId::from_string("ws-1"),
                container_id: "c1".to_owned(),
                state: ContainerState::Paused,
            },
            ObservedContainer {
                workstream_id: WorkstreamId::from_string("ws-2"),
                container_id: "c2".to_owned(),
                state: ContainerState::Missing,
            },
        ]
    );
    assert_eq!(runtime.container_ids(), vec!["c1".to_owned()]);
    assert!(f.world.tracker.container_ids().is_empty());
}

#[test]
fn crash_recovery_removes_containers_started_after_the_last_save() {
    let f = fixture();
    running(&f, "ws-1", "feature-x");

    let result = sagas::recover_crashed(
        &f.world.collaborators(),
        &[snapshot("ws-1", "feature-x")],
    );

    assert!(
        matches!(
            &result,
            Message::CrashRecoveryCompleted { orphans_removed, observed }
                if orphans_removed == &vec!["c1".to_owned()] && observed.is_empty()
        ),
        "{result:?}"
    );
    assert!(f.world.runtime.container_ids().is_empty());
    assert!(f.world.tracker.container_ids().is_empty());
}

#[test]
fn crash_recovery_leaves_in_flight_workstreams_alone() {
    let f = fixture();
    running(&f, "ws-1", "feature-x");
    let mut provisioning = snapshot("ws-1", "feature-x");
    provisioning.in_flight = true;

    let result = sagas::recover_crashed(&f.world.collaborators(), &[provisioning]);

    assert!(
        matches!(
            &result,
            Message::CrashRecoveryCompleted { orphans_removed, .. } if orphans_removed.is_empty()
        ),
        "{result:?}"
    );
    assert_eq!(f.world.runtime.container_ids(), vec!["c1".to_owned()]);
}

#[test]
fn untracked_container_still_starts_and_is_found_by_its_label() {
    let f = fixture();
    f.world.tracker.fail("track");

    let mut ws = snapshot("ws-1", "feature-x");
    let result = sagas::provision(&f.world.collaborators(), &f.config, &ws, BranchMode::New);

    let Message::WorkstreamStarted { container_id, .. } = result else {
        panic!("expected the workstream to start, got {result:?}");
    };
    assert_eq!(f.world.runtime.state_of(&container_id), ContainerState::Running);
    assert!(f.world.tracker.container_ids().is_empty());

    ws.container_id = Some(container_id.clone());
    let result = sagas::recover_crashed(&f.world.collaborators(), &[ws]);
    assert!(
        matches!(
            &result,
            Message::CrashRecoveryCompleted { orphans_removed, .. } if orphans_removed.is_empty()
        ),
        "{result:?}"
    );

    let result = sagas::recover_crashed(&f.world.collaborators(), &[]);
    assert!(
        matches!(
            &result,
            Message::CrashRecoveryCompleted { orphans_removed, .. }
                if orphans_removed == &vec![container_id.clone()]
        ),
        "{result:?}"
    );
}

#[test]
fn prune_tears_down_then_sweeps_stopped_containers() {
    let f = fixture();
    let a = running(&f, "ws-1", "feature-a");
    let b = running(&f, "ws-2", "feature-b");
    f.world
        .runtime
        .insert_container("c5", ContainerState::Exited, None);

    let result = sagas::prune(&f.world.collaborators(), &f.config, &[a, b]);

    match result {
        Message::Pruned {
            workstream_ids,
            containers_removed,
        } => {
            assert_eq!(
                workstream_ids,
                vec![
                    WorkstreamId::from_string("ws-1"),
                    WorkstreamId::from_string("ws-2"),
                ]
            );
            assert_eq!(containers_removed, 1);
        }
        other => panic!("unexpected prune result: {other:?}"),
    }
    assert!(f.world.runtime.container_ids().is_empty());
    assert!(f.world.git.worktrees().is_empty());
}
