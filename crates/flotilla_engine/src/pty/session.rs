use anyhow::{Context as _, anyhow};
use flotilla_domain::{ExecConnection, WorkstreamId};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

struct SessionInner {
    closed: bool,
    connection: Option<Box<dyn ExecConnection>>,
}

/// An attached agent terminal inside a workstream container.
///
/// `close` may be called from any thread, any number of times. Only the first
/// call releases the connection and signals completion. Input is serialized on
/// its own lock, so a stalled write never holds up `close`.
pub struct PtySession {
    workstream_id: WorkstreamId,
    exec_id: String,
    cancel: CancellationToken,
    inner: Mutex<SessionInner>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    closed_tx: watch::Sender<bool>,
}

impl PtySession {
    /// Wraps `connection`, handing back its output stream for the read loop.
    pub fn new(
        workstream_id: WorkstreamId,
        mut connection: Box<dyn ExecConnection>,
    ) -> (Arc<Self>, Option<Box<dyn Read + Send>>) {
        let reader = connection.take_reader();
        let writer = connection.take_writer();
        let exec_id = connection.exec_id().to_owned();
        let (closed_tx, _) = watch::channel(false);

        let session = Arc::new(Self {
            workstream_id,
            exec_id,
            cancel: CancellationToken::new(),
            inner: Mutex::new(SessionInner {
                closed: false,
                connection: Some(connection),
            }),
            writer: Mutex::new(writer),
            closed_tx,
        });
        (session, reader)
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn workstream_id(&self) -> &WorkstreamId {
        &self.workstream_id
    }

    pub fn exec_id(&self) -> &str {
        &self.exec_id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn write(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let mut slot = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            slot.take();
            return Err(anyhow!("closed"));
        }
        let writer = slot.as_mut().ok_or_else(|| anyhow!("closed"))?;
        writer.write_all(bytes).context("pty write")?;
        writer.flush().context("pty flush")?;
        Ok(())
    }

    /// No-op once closed or when the runtime handle is gone.
    pub fn resize(&self, width: u16, height: u16) -> anyhow::Result<()> {
        let inner = self.lock();
        if inner.closed {
            return Ok(());
        }
        let Some(connection) = inner.connection.as_ref() else {
            return Ok(());
        };
        connection.resize(width, height).map_err(|err| anyhow!(err))
    }

    pub fn close(&self) {
        self.cancel.cancel();

        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        if let Some(mut connection) = inner.connection.take()
            && let Err(err) = connection.close()
        {
            tracing::warn!(
                workstream_id = %self.workstream_id,
                exec_id = %self.exec_id,
                error = %err,
                "failed to close pty connection"
            );
        }
        drop(inner);
        // A write in progress drops the writer itself on its next call.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }

        self.closed_tx.send_replace(true);
        tracing::debug!(workstream_id = %self.workstream_id, "pty session closed");
    }

    /// Changes to `true` exactly once, when the session closes.
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }
}
