mod docker;
pub mod env;
mod gh;
mod git;
mod mutagen;
mod process;
mod sqlite_store;
#[cfg(test)]
mod test_support;

pub use docker::DockerCli;
pub use gh::GhCli;
pub use git::GitCli;
pub use mutagen::MutagenCli;
pub use sqlite_store::SqliteStore;
