use crate::{
    AppState, BranchMode, ContainerState, Effect, Message, Notice, ObservedContainer, Pairing,
    PendingOperation, PtyStatus, PullRequestRef, Workstream, WorkstreamId, WorkstreamState,
};

mod slug;

use slug::branch_slug;

fn now_unix_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

fn notify_error(workstream_id: &WorkstreamId, message: impl Into<String>) -> Effect {
    Effect::Notify {
        workstream_id: Some(workstream_id.clone()),
        notice: Notice::Error {
            message: message.into(),
        },
    }
}

impl AppState {
    pub fn apply(&mut self, message: Message) -> Vec<Effect> {
        match message {
            Message::AppStarted => vec![Effect::LoadState],
            Message::StateLoaded { workstreams } => {
                self.workstreams = workstreams.into_iter().map(Workstream::from).collect();
                self.last_error = None;
                vec![Effect::RecoverCrashed {
                    known_workstreams: self.workstreams.iter().map(|w| w.id.clone()).collect(),
                }]
            }
            Message::StateLoadFailed { message } => {
                self.last_error = Some(message.clone());
                vec![Effect::Notify {
                    workstream_id: None,
                    notice: Notice::Error { message },
                }]
            }
            Message::StateSaved => Vec::new(),
            Message::StateSaveFailed { message } => {
                self.last_error = Some(message.clone());
                vec![Effect::Notify {
                    workstream_id: None,
                    notice: Notice::Error { message },
                }]
            }
            Message::TerminalResized { width, height } => {
                if width == 0 || height == 0 {
                    return Vec::new();
                }
                self.terminal_size.width = width;
                self.terminal_size.height = height;
                vec![Effect::ResizePtys { width, height }]
            }

            Message::CreateWorkstream {
                id,
                prompt,
                branch_name,
            } => {
                if self.workstream(&id).is_some() {
                    return Vec::new();
                }
                let branch_name = match branch_name.trim() {
                    "" => branch_slug(&prompt),
                    trimmed => trimmed.to_owned(),
                };
                let mut workstream = Workstream::new(id.clone(), prompt, branch_name, now_unix_ms());
                workstream.state = WorkstreamState::Provisioning;
                self.workstreams.push(workstream);
                vec![
                    Effect::SaveState,
                    Effect::Provision {
                        workstream_id: id,
                        mode: BranchMode::New,
                    },
                ]
            }
            Message::ProvisionWorkstream {
                workstream_id,
                mode,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if !matches!(
                    workstream.state,
                    WorkstreamState::Created
                        | WorkstreamState::AwaitingBranchDecision
                        | WorkstreamState::Failed
                ) || workstream.container_id.is_some()
                {
                    let state = workstream.state;
                    return vec![notify_error(
                        &workstream_id,
                        format!("cannot provision a workstream that is {state}"),
                    )];
                }
                workstream.state = WorkstreamState::Provisioning;
                workstream.last_error = None;
                vec![
                    Effect::SaveState,
                    Effect::Provision {
                        workstream_id,
                        mode,
                    },
                ]
            }
            Message::BranchConflict {
                workstream_id,
                branch_name,
                info,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.state = WorkstreamState::AwaitingBranchDecision;
                vec![
                    Effect::SaveState,
                    Effect::Notify {
                        workstream_id: Some(workstream_id),
                        notice: Notice::BranchConflict { branch_name, info },
                    },
                ]
            }
            Message::WorkstreamStarted {
                workstream_id,
                container_id,
                branch_name,
                worktree_path,
            } => {
                let size = self.terminal_size;
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.state = WorkstreamState::Running;
                workstream.container_id = Some(container_id);
                workstream.branch_name = branch_name;
                workstream.worktree_path = Some(worktree_path);
                workstream.last_error = None;
                workstream.pty = PtyStatus::Attaching;
                vec![
                    Effect::SaveState,
                    Effect::AttachPty {
                        workstream_id,
                        resume: false,
                        width: size.width,
                        height: size.height,
                    },
                ]
            }
            Message::ProvisionFailed {
                workstream_id,
                message,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.state = WorkstreamState::Failed;
                workstream.last_error = Some(message.clone());
                vec![Effect::SaveState, notify_error(&workstream_id, message)]
            }

            Message::AttachPty { workstream_id } => {
                let size = self.terminal_size;
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if workstream.state != WorkstreamState::Running
                    || workstream.container_id.is_none()
                {
                    let state = workstream.state;
                    return vec![notify_error(
                        &workstream_id,
                        format!("cannot attach to a workstream that is {state}"),
                    )];
                }
                if workstream.pty != PtyStatus::Detached {
                    return Vec::new();
                }
                workstream.pty = PtyStatus::Attaching;
                vec![Effect::AttachPty {
                    workstream_id,
                    resume: true,
                    width: size.width,
                    height: size.height,
                }]
            }
            Message::PtyAttached { workstream_id, .. } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if workstream.pty == PtyStatus::Attaching {
                    workstream.pty = PtyStatus::Attached;
                }
                Vec::new()
            }
            Message::PtyAttachFailed {
                workstream_id,
                message,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.pty = PtyStatus::Detached;
                workstream.last_error = Some(message.clone());
                vec![notify_error(&workstream_id, message)]
            }
            Message::PtyOutput {
                workstream_id,
                bytes,
            } => {
                if self.workstream(&workstream_id).is_none() {
                    return Vec::new();
                }
                vec![Effect::ForwardPtyOutput {
                    workstream_id,
                    bytes,
                }]
            }
            Message::PtyClosed {
                workstream_id,
                error,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.pty = PtyStatus::Detached;
                match error {
                    Some(message) => {
                        workstream.last_error = Some(message.clone());
                        vec![notify_error(&workstream_id, message)]
                    }
                    None => Vec::new(),
                }
            }
            Message::DetachPty { workstream_id } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if workstream.pty == PtyStatus::Detached {
                    return Vec::new();
                }
                workstream.pty = PtyStatus::Detached;
                vec![Effect::ClosePty { workstream_id }]
            }

            Message::PauseWorkstream { workstream_id } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if workstream.state != WorkstreamState::Running {
                    let state = workstream.state;
                    return vec![notify_error(
                        &workstream_id,
                        format!("cannot pause a workstream that is {state}"),
                    )];
                }
                if workstream.pending.is_some() {
                    return Vec::new();
                }
                workstream.pending = Some(PendingOperation::Pause);
                vec![Effect::Pause { workstream_id }]
            }
            Message::WorkstreamPaused { workstream_id } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.state = WorkstreamState::Paused;
                workstream.pty = PtyStatus::Detached;
                workstream.pending = None;
                vec![Effect::SaveState]
            }
            Message::PauseFailed {
                workstream_id,
                message,
            } => self.finish_with_error(workstream_id, message),
            Message::ResumeWorkstream { workstream_id } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if workstream.state != WorkstreamState::Paused {
                    let state = workstream.state;
                    return vec![notify_error(
                        &workstream_id,
                        format!("cannot resume a workstream that is {state}"),
                    )];
                }
                if workstream.container_id.is_none() {
                    return vec![notify_error(&workstream_id, "workstream has no container")];
                }
                workstream.state = WorkstreamState::Resuming;
                workstream.last_error = None;
                vec![Effect::SaveState, Effect::Resume { workstream_id }]
            }
            Message::WorkstreamResumed { workstream_id } => {
                let size = self.terminal_size;
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.state = WorkstreamState::Running;
                workstream.pty = PtyStatus::Attaching;
                vec![
                    Effect::SaveState,
                    Effect::AttachPty {
                        workstream_id,
                        resume: true,
                        width: size.width,
                        height: size.height,
                    },
                ]
            }
            Message::ResumeFailed {
                workstream_id,
                message,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.state = WorkstreamState::Paused;
                workstream.last_error = Some(message.clone());
                vec![Effect::SaveState, notify_error(&workstream_id, message)]
            }

            Message::DestroyWorkstream { workstream_id } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                match workstream.state {
                    WorkstreamState::Stopping => Vec::new(),
                    WorkstreamState::Provisioning | WorkstreamState::Resuming => {
                        let state = workstream.state;
                        vec![notify_error(
                            &workstream_id,
                            format!("cannot destroy a workstream that is {state}"),
                        )]
                    }
                    _ => {
                        workstream.state = WorkstreamState::Stopping;
                        workstream.pty = PtyStatus::Detached;
                        vec![Effect::SaveState, Effect::Teardown { workstream_id }]
                    }
                }
            }
            Message::WorkstreamStopped {
                workstream_id,
                stashed_changes,
                warnings,
                ..
            } => {
                let before = self.workstreams.len();
                self.workstreams.retain(|w| w.id != workstream_id);
                if self.workstreams.len() == before {
                    return Vec::new();
                }
                let mut effects = vec![Effect::SaveState];
                if !warnings.is_empty() {
                    effects.push(notify_error(&workstream_id, warnings.join("; ")));
                }
                if stashed_changes {
                    effects.push(Effect::Notify {
                        workstream_id: Some(workstream_id),
                        notice: Notice::StashReminder,
                    });
                }
                effects
            }

            Message::CreatePullRequest { workstream_id } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if workstream.worktree_path.is_none() {
                    return vec![notify_error(&workstream_id, "workstream has no worktree")];
                }
                if workstream.pending.is_some() {
                    return Vec::new();
                }
                workstream.pending = Some(PendingOperation::PullRequest);
                vec![Effect::CreatePullRequest { workstream_id }]
            }
            Message::PullRequestCreated {
                workstream_id,
                url,
                number,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.pending = None;
                workstream.pull_request = Some(PullRequestRef {
                    url: url.clone(),
                    number,
                });
                vec![
                    Effect::SaveState,
                    Effect::Notify {
                        workstream_id: Some(workstream_id),
                        notice: Notice::PullRequestCreated { url, number },
                    },
                ]
            }
            Message::PullRequestFailed {
                workstream_id,
                message,
            } => self.finish_with_error(workstream_id, message),

            Message::MergeWorkstream {
                workstream_id,
                commit_first,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if workstream.worktree_path.is_none() {
                    return vec![notify_error(&workstream_id, "workstream has no worktree")];
                }
                if workstream.pending.is_some() {
                    return Vec::new();
                }
                workstream.pending = Some(PendingOperation::Merge);
                vec![Effect::Merge {
                    workstream_id,
                    commit_first,
                }]
            }
            Message::MergeNeedsCommit { workstream_id } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.pending = None;
                vec![Effect::Notify {
                    workstream_id: Some(workstream_id),
                    notice: Notice::MergeNeedsCommit,
                }]
            }
            Message::Merged {
                workstream_id,
                committed,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.pending = None;
                vec![Effect::Notify {
                    workstream_id: Some(workstream_id),
                    notice: Notice::Merged { committed },
                }]
            }
            Message::MergeFailed {
                workstream_id,
                message,
            } => self.finish_with_error(workstream_id, message),

            Message::EnablePairing { workstream_id } => {
                if let Some(paired) = self.paired_workstream() {
                    let message = if paired.id == workstream_id {
                        "pairing is already enabled for this workstream".to_owned()
                    } else {
                        format!("pairing is already enabled for {}", paired.id)
                    };
                    return vec![notify_error(&workstream_id, message)];
                }
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if workstream.state != WorkstreamState::Running
                    || workstream.container_id.is_none()
                {
                    let state = workstream.state;
                    return vec![notify_error(
                        &workstream_id,
                        format!("cannot pair with a workstream that is {state}"),
                    )];
                }
                if workstream.pending.is_some() {
                    return Vec::new();
                }
                workstream.pending = Some(PendingOperation::PairingEnable);
                vec![Effect::EnablePairing { workstream_id }]
            }
            Message::PairingEnabled {
                workstream_id,
                previous_branch,
                stashed_changes,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.pending = None;
                workstream.pairing = Some(Pairing {
                    previous_branch,
                    stashed_changes,
                });
                vec![Effect::SaveState]
            }
            Message::PairingEnableFailed {
                workstream_id,
                message,
                ..
            } => self.finish_with_error(workstream_id, message),
            Message::DisablePairing { workstream_id } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if workstream.pairing.is_none() {
                    return vec![notify_error(&workstream_id, "pairing is not enabled")];
                }
                if workstream.pending.is_some() {
                    return Vec::new();
                }
                workstream.pending = Some(PendingOperation::PairingDisable);
                vec![Effect::DisablePairing { workstream_id }]
            }
            Message::PairingDisabled {
                workstream_id,
                stashed_changes,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.pending = None;
                workstream.pairing = None;
                let mut effects = vec![Effect::SaveState];
                if stashed_changes {
                    effects.push(Effect::Notify {
                        workstream_id: Some(workstream_id),
                        notice: Notice::StashReminder,
                    });
                }
                effects
            }
            Message::PairingDisableFailed {
                workstream_id,
                message,
            } => self.finish_with_error(workstream_id, message),

            Message::FetchLogs { workstream_id } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                if workstream.pending.is_some() {
                    return Vec::new();
                }
                workstream.pending = Some(PendingOperation::Logs);
                vec![Effect::FetchLogs { workstream_id }]
            }
            Message::LogsFetched {
                workstream_id,
                logs,
            } => {
                let Some(workstream) = self.workstream_mut(&workstream_id) else {
                    return Vec::new();
                };
                workstream.pending = None;
                vec![Effect::Notify {
                    workstream_id: Some(workstream_id),
                    notice: Notice::Logs { text: logs },
                }]
            }
            Message::LogsFetchFailed {
                workstream_id,
                message,
            } => self.finish_with_error(workstream_id, message),

            Message::PruneWorkstreams => {
                let mut workstream_ids = Vec::new();
                for workstream in &mut self.workstreams {
                    if workstream.state == WorkstreamState::Running
                        || workstream.state.is_transient()
                    {
                        continue;
                    }
                    workstream.state = WorkstreamState::Stopping;
                    workstream.pty = PtyStatus::Detached;
                    workstream_ids.push(workstream.id.clone());
                }
                let mut effects = Vec::new();
                if !workstream_ids.is_empty() {
                    effects.push(Effect::SaveState);
                }
                effects.push(Effect::Prune { workstream_ids });
                effects
            }
            Message::Pruned {
                workstream_ids,
                containers_removed,
            } => {
                self.workstreams.retain(|w| !workstream_ids.contains(&w.id));
                vec![
                    Effect::SaveState,
                    Effect::Notify {
                        workstream_id: None,
                        notice: Notice::Pruned {
                            workstreams: workstream_ids.len(),
                            containers: containers_removed,
                        },
                    },
                ]
            }

            Message::RecoverCrashed => vec![Effect::RecoverCrashed {
                known_workstreams: self.workstreams.iter().map(|w| w.id.clone()).collect(),
            }],
            Message::CrashRecoveryCompleted {
                orphans_removed,
                observed,
            } => self.reconcile_observed(orphans_removed, observed),
        }
    }

    fn finish_with_error(&mut self, workstream_id: WorkstreamId, message: String) -> Vec<Effect> {
        let Some(workstream) = self.workstream_mut(&workstream_id) else {
            return Vec::new();
        };
        workstream.pending = None;
        workstream.last_error = Some(message.clone());
        vec![notify_error(&workstream_id, message)]
    }

    fn reconcile_observed(
        &mut self,
        orphans_removed: Vec<String>,
        observed: Vec<ObservedContainer>,
    ) -> Vec<Effect> {
        let size = self.terminal_size;
        let mut effects = vec![Effect::SaveState];

        for entry in observed {
            let Some(workstream) = self.workstream_mut(&entry.workstream_id) else {
                continue;
            };
            if workstream.container_id.as_deref() != Some(entry.container_id.as_str()) {
                continue;
            }
            match entry.state {
                ContainerState::Running => {
                    workstream.state = WorkstreamState::Running;
                    if workstream.pty == PtyStatus::Detached {
                        workstream.pty = PtyStatus::Attaching;
                        effects.push(Effect::AttachPty {
                            workstream_id: entry.workstream_id,
                            resume: true,
                            width: size.width,
                            height: size.height,
                        });
                    }
                }
                ContainerState::Paused => {
                    workstream.state = WorkstreamState::Paused;
                }
                ContainerState::Missing => {
                    workstream.state = WorkstreamState::Stopped;
                    workstream.container_id = None;
                }
                _ => {
                    workstream.state = WorkstreamState::Stopped;
                }
            }
        }

        if !orphans_removed.is_empty() {
            effects.push(Effect::Notify {
                workstream_id: None,
                notice: Notice::OrphansRemoved {
                    containers: orphans_removed,
                },
            });
        }
        effects
    }
}
