use super::WorkstreamSnapshot;
use crate::collaborators::Collaborators;
use flotilla_domain::{ContainerState, CrashRecoveryRecord, Message};

pub const LOG_TAIL_LINES: usize = 200;

/// Freezes the container. The PTY session must already be closed.
pub fn pause(deps: &Collaborators, workstream: &WorkstreamSnapshot) -> Message {
    let workstream_id = workstream.id.clone();
    let Some(container_id) = workstream.container_id.as_deref() else {
        return Message::PauseFailed {
            workstream_id,
            message: "workstream has no container".to_owned(),
        };
    };

    match deps.runtime.pause_container(container_id) {
        Ok(()) => Message::WorkstreamPaused { workstream_id },
        Err(message) => {
            tracing::error!(workstream_id = %workstream_id, error = %message, "pause failed");
            Message::PauseFailed {
                workstream_id,
                message,
            }
        }
    }
}

/// Brings a paused container back. A running one is left alone; anything else
/// cannot be resumed.
pub fn resume(deps: &Collaborators, workstream: &WorkstreamSnapshot) -> Message {
    let workstream_id = workstream.id.clone();
    let failed = |message: String| {
        tracing::error!(workstream_id = %workstream.id, error = %message, "resume failed");
        Message::ResumeFailed {
            workstream_id: workstream.id.clone(),
            message,
        }
    };

    let Some(container_id) = workstream.container_id.as_deref() else {
        return failed("workstream has no container".to_owned());
    };

    match deps.runtime.container_state(container_id) {
        Ok(ContainerState::Paused) => {
            if let Err(err) = deps.runtime.unpause_container(container_id) {
                return failed(err);
            }
        }
        Ok(ContainerState::Running) => {}
        Ok(state) => {
            return failed(format!(
                "container {container_id} is {state} and cannot be resumed"
            ));
        }
        Err(err) => return failed(err),
    }

    let record = CrashRecoveryRecord {
        container_id: container_id.to_owned(),
        workstream_id: workstream.id.as_str().to_owned(),
        branch_name: workstream.branch_name.clone(),
        path: workstream.worktree_path.clone().unwrap_or_default(),
    };
    if let Err(err) = deps.tracker.track(&record) {
        tracing::warn!(workstream_id = %workstream_id, error = %err, "failed to re-track container");
    }

    Message::WorkstreamResumed { workstream_id }
}

/// Last [`LOG_TAIL_LINES`] lines of container output. No container means no logs.
pub fn fetch_logs(deps: &Collaborators, workstream: &WorkstreamSnapshot) -> Message {
    let workstream_id = workstream.id.clone();
    let Some(container_id) = workstream.container_id.as_deref() else {
        return Message::LogsFetched {
            workstream_id,
            logs: String::new(),
        };
    };

    match deps.runtime.container_logs(container_id, LOG_TAIL_LINES) {
        Ok(logs) => Message::LogsFetched {
            workstream_id,
            logs,
        },
        Err(message) => Message::LogsFetchFailed {
            workstream_id,
            message,
        },
    }
}
