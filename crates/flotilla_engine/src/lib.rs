use tokio::sync::broadcast;

mod collaborators;
mod command;
mod compensation;
pub mod config;
pub mod engine;
pub mod pty;
pub mod sagas;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use collaborators::Collaborators;
pub use config::{EngineConfig, Timeouts};
pub use engine::{Engine, EngineEvent, EngineHandle, EngineSnapshot};

/// Starts an engine on the CLI-backed collaborators described by `config`.
/// Must be called from within a tokio runtime.
pub fn start(
    config: EngineConfig,
) -> anyhow::Result<(EngineHandle, broadcast::Sender<EngineEvent>)> {
    let deps = Collaborators::from_config(&config)?;
    Ok(Engine::start(deps, config))
}
