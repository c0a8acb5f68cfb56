use std::time::{Duration, Instant};

/// Text of the agent's permission-bypass confirmation screen.
pub const BYPASS_PROMPT_MARKER: &str = "Bypass Permissions mode";
/// How long after attach the prompt is looked for.
pub const STARTUP_WINDOW: Duration = Duration::from_secs(10);
/// Selects "accept" on the confirmation screen, then confirms.
pub const ACCEPT_SEQUENCE: [&[u8]; 2] = [b"\x1b[B", b"\r"];
pub const SETTLE_DELAYS: [Duration; 2] = [Duration::from_millis(300), Duration::from_millis(200)];

const MAX_SCAN_BYTES: usize = 16 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanState {
    Scanning,
    Matched,
    Expired,
}

/// Watches early PTY output for the confirmation prompt. Fires at most once.
#[derive(Debug)]
pub struct StartupScanner {
    state: ScanState,
    started: Instant,
    window: Duration,
    buffer: Vec<u8>,
}

impl StartupScanner {
    pub fn new(started: Instant) -> Self {
        Self::with_window(started, STARTUP_WINDOW)
    }

    pub fn with_window(started: Instant, window: Duration) -> Self {
        Self {
            state: ScanState::Scanning,
            started,
            window,
            buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Feeds one output chunk. Returns `true` on the chunk that completes the
    /// marker; every later call returns `false`.
    pub fn observe(&mut self, chunk: &[u8], now: Instant) -> bool {
        if self.state != ScanState::Scanning {
            return false;
        }
        if now.saturating_duration_since(self.started) > self.window {
            self.state = ScanState::Expired;
            self.buffer = Vec::new();
            return false;
        }

        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > MAX_SCAN_BYTES {
            let excess = self.buffer.len() - MAX_SCAN_BYTES;
            self.buffer.drain(..excess);
        }

        let marker = BYPASS_PROMPT_MARKER.as_bytes();
        if self.buffer.windows(marker.len()).any(|w| w == marker) {
            self.state = ScanState::Matched;
            self.buffer = Vec::new();
            return true;
        }
        false
    }
}
