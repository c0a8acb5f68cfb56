mod app;
mod ids;
mod persisted;
mod workstream;

pub use app::{AppState, DEFAULT_TERMINAL_HEIGHT, DEFAULT_TERMINAL_WIDTH, TerminalSize};
pub use ids::WorkstreamId;
pub use persisted::PersistedWorkstream;
pub use workstream::{
    Pairing, PendingOperation, PtyStatus, PullRequestRef, Workstream, WorkstreamState,
};
