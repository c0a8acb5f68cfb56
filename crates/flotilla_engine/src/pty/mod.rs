mod registry;
mod session;
mod startup;

pub use registry::PtyRegistry;
pub use session::PtySession;
pub use startup::{
    ACCEPT_SEQUENCE, BYPASS_PROMPT_MARKER, STARTUP_WINDOW, ScanState, StartupScanner,
};

use crate::sagas::CONTAINER_WORKSPACE;
use anyhow::Context as _;
use flotilla_domain::{ContainerRuntime, ExecRequest, Message, WorkstreamId, shell};
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

const READ_CHUNK_BYTES: usize = 16 * 1024;

/// Everything needed to start the agent terminal of one workstream.
#[derive(Clone, Debug)]
pub struct AttachRequest {
    pub workstream_id: WorkstreamId,
    pub container_id: String,
    /// Initial task for a fresh agent. Ignored when resuming.
    pub prompt: String,
    pub resume: bool,
    pub width: u16,
    pub height: u16,
    pub agent_cmd: String,
    pub extra_env: Vec<(String, String)>,
}

/// `sh -c` command line that starts the agent, either on a new task or
/// continuing its previous conversation.
pub fn agent_command(agent_cmd: &str, prompt: &str, resume: bool) -> Vec<String> {
    let mut line = format!("{agent_cmd} --dangerously-skip-permissions");
    if resume {
        line.push_str(" --continue");
    } else if !prompt.trim().is_empty() {
        line.push_str(" \"");
        line.push_str(&shell::escape_double_quoted(prompt));
        line.push('"');
    }
    vec!["sh".to_owned(), "-c".to_owned(), line]
}

fn exec_request(request: &AttachRequest) -> ExecRequest {
    let mut env = vec![
        ("TERM".to_owned(), "xterm-256color".to_owned()),
        ("COLORTERM".to_owned(), "truecolor".to_owned()),
    ];
    env.extend(request.extra_env.iter().cloned());

    ExecRequest {
        container_id: request.container_id.clone(),
        command: agent_command(&request.agent_cmd, &request.prompt, request.resume),
        env,
        working_dir: Some(CONTAINER_WORKSPACE.to_owned()),
        width: request.width,
        height: request.height,
    }
}

/// Opens the exec session, registers it and starts its read loop. Blocking;
/// runs inside a command.
pub fn attach(
    runtime: &dyn ContainerRuntime,
    registry: &PtyRegistry,
    request: AttachRequest,
    output: mpsc::UnboundedSender<Message>,
    handle: &tokio::runtime::Handle,
) -> Message {
    let workstream_id = request.workstream_id.clone();
    let connection = match runtime.exec_attach(&exec_request(&request)) {
        Ok(connection) => connection,
        Err(message) => {
            tracing::error!(workstream_id = %workstream_id, error = %message, "pty attach failed");
            return Message::PtyAttachFailed {
                workstream_id,
                message,
            };
        }
    };

    let (session, reader) = PtySession::new(workstream_id.clone(), connection);
    let Some(reader) = reader else {
        session.close();
        return Message::PtyAttachFailed {
            workstream_id,
            message: "exec session has no output stream".to_owned(),
        };
    };

    if let Err(err) = spawn_read_loop(session.clone(), reader, !request.resume, output, handle) {
        session.close();
        return Message::PtyAttachFailed {
            workstream_id,
            message: format!("{err:#}"),
        };
    }

    if let Some(previous) = registry.insert(session.clone()) {
        previous.close();
    }
    tracing::info!(workstream_id = %workstream_id, exec_id = session.exec_id(), resume = request.resume, "pty attached");
    Message::PtyAttached {
        workstream_id,
        exec_id: session.exec_id().to_owned(),
    }
}

enum Chunk {
    Data(Vec<u8>),
    Failed(String),
}

/// A blocking reader thread feeds an async loop that forwards output in order
/// and races every receive against cancellation.
fn spawn_read_loop(
    session: Arc<PtySession>,
    mut reader: Box<dyn Read + Send>,
    scan_startup: bool,
    output: mpsc::UnboundedSender<Message>,
    handle: &tokio::runtime::Handle,
) -> anyhow::Result<()> {
    let (chunks_tx, mut chunks) = mpsc::unbounded_channel::<Chunk>();
    let cancel = session.cancellation().clone();

    std::thread::Builder::new()
        .name("flotilla-pty-read".to_owned())
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK_BYTES];
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if chunks_tx.send(Chunk::Data(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        let _ = chunks_tx.send(Chunk::Failed(err.to_string()));
                        break;
                    }
                }
            }
        })
        .context("spawn pty reader thread")?;

    let mut scanner = scan_startup.then(|| StartupScanner::new(Instant::now()));
    handle.spawn(async move {
        let workstream_id = session.workstream_id().clone();
        let cancel = session.cancellation().clone();
        let error = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = chunks.recv() => next,
            };
            match next {
                Some(Chunk::Data(bytes)) => {
                    if let Some(scanner) = scanner.as_mut()
                        && scanner.observe(&bytes, Instant::now())
                    {
                        tracing::info!(workstream_id = %workstream_id, "accepting permission prompt");
                        inject_accept(session.clone());
                    }
                    if output
                        .send(Message::PtyOutput {
                            workstream_id: workstream_id.clone(),
                            bytes,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                Some(Chunk::Failed(err)) => break Some(err),
                None => break None,
            }
        };

        if cancel.is_cancelled() {
            return;
        }
        let closing = session.clone();
        let _ = tokio::task::spawn_blocking(move || closing.close()).await;
        let _ = output.send(Message::PtyClosed {
            workstream_id,
            error,
        });
    });
    Ok(())
}

fn inject_accept(session: Arc<PtySession>) {
    let spawned = std::thread::Builder::new()
        .name("flotilla-pty-accept".to_owned())
        .spawn(move || {
            for (delay, bytes) in startup::SETTLE_DELAYS.iter().zip(ACCEPT_SEQUENCE) {
                std::thread::sleep(*delay);
                if let Err(err) = session.write(bytes) {
                    tracing::warn!(workstream_id = %session.workstream_id(), error = %format!("{err:#}"), "failed to answer permission prompt");
                    return;
                }
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "failed to spawn prompt responder");
    }
}
