use flotilla_domain::Message;
use std::time::Duration;
use tokio::sync::mpsc;

type Work = Box<dyn FnOnce() -> Message + Send + 'static>;
type OnError = Box<dyn FnOnce(String) -> Message + Send + 'static>;

/// One unit of blocking background work that reports exactly one [`Message`].
///
/// Everything the work needs is captured by value when the command is built,
/// so it never observes reducer state that changes while it runs.
pub struct Command {
    label: &'static str,
    timeout: Duration,
    work: Work,
    on_error: OnError,
}

impl Command {
    pub fn new(
        label: &'static str,
        timeout: Duration,
        work: impl FnOnce() -> Message + Send + 'static,
        on_error: impl FnOnce(String) -> Message + Send + 'static,
    ) -> Self {
        Self {
            label,
            timeout,
            work: Box::new(work),
            on_error: Box::new(on_error),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Runs the work on the blocking pool. A timeout or a panicked task is
    /// reported through `on_error`; the blocking work itself is not aborted.
    pub async fn run(self) -> Message {
        let Command {
            label,
            timeout,
            work,
            on_error,
        } = self;

        let task = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(message)) => message,
            Ok(Err(err)) => {
                tracing::error!(command = label, error = %err, "command task failed");
                on_error(format!("{label} failed: {err}"))
            }
            Err(_) => {
                tracing::warn!(command = label, ?timeout, "command timed out");
                on_error(format!("{label} timed out after {timeout:?}"))
            }
        }
    }
}

/// Spawns `command` and delivers its message on `tx`.
pub fn execute(command: Command, tx: mpsc::UnboundedSender<Message>) {
    tokio::spawn(async move {
        let label = command.label();
        let message = command.run().await;
        if tx.send(message).is_err() {
            tracing::debug!(command = label, "engine gone, dropping command result");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_domain::WorkstreamId;

    fn logs_failed(message: String) -> Message {
        Message::LogsFetchFailed {
            workstream_id: WorkstreamId::from_string("ws-1"),
            message,
        }
    }

    #[tokio::test]
    async fn delivers_the_work_result() {
        let command = Command::new(
            "fetch logs",
            Duration::from_secs(5),
            || Message::LogsFetched {
                workstream_id: WorkstreamId::from_string("ws-1"),
                logs: "hello".to_owned(),
            },
            logs_failed,
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        execute(command, tx);
        let message = rx.recv().await.unwrap();
        assert!(matches!(message, Message::LogsFetched { logs, .. } if logs == "hello"));
    }

    #[tokio::test]
    async fn timeout_completes_with_an_error_message() {
        let command = Command::new(
            "fetch logs",
            Duration::from_millis(20),
            || {
                std::thread::sleep(Duration::from_millis(500));
                Message::StateSaved
            },
            logs_failed,
        );

        match command.run().await {
            Message::LogsFetchFailed { message, .. } => {
                assert_eq!(message, "fetch logs timed out after 20ms");
            }
            other => panic!("expected a failure message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_work_reports_an_error() {
        let command = Command::new(
            "fetch logs",
            Duration::from_secs(5),
            || panic!("boom"),
            logs_failed,
        );

        let message = command.run().await;
        assert!(matches!(
            message,
            Message::LogsFetchFailed { message, .. } if message.starts_with("fetch logs failed")
        ));
    }
}
