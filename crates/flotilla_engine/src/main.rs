use anyhow::Context as _;
use clap::{Parser, Subcommand};
use flotilla_backend::SqliteStore;
use flotilla_domain::{Message, Notice};
use flotilla_engine::{EngineConfig, EngineEvent};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flotilla")]
#[command(version, about = "Maintenance commands for flotilla workstreams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print persisted workstreams as JSON
    List,
    /// Reconcile tracked containers with persisted workstreams
    Recover,
    /// Tear down every workstream that is not running
    Prune,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env()?;

    match cli.command {
        Commands::List => {
            let store = SqliteStore::new(config.sqlite_path())?;
            let workstreams = tokio::task::spawn_blocking(move || store.load_workstreams())
                .await
                .context("failed to join load task")??;
            println!("{}", serde_json::to_string_pretty(&workstreams)?);
        }
        Commands::Recover => {
            config.headless = true;
            let (engine, _events) = flotilla_engine::start(config)?;
            engine.wait_idle().await?;
            let snapshot = engine.snapshot().await?;
            for workstream in &snapshot.workstreams {
                println!(
                    "{}\t{}\t{}",
                    workstream.id, workstream.state, workstream.branch_name
                );
            }
        }
        Commands::Prune => {
            config.headless = true;
            let (engine, events) = flotilla_engine::start(config)?;
            let mut events = events.subscribe();
            engine.wait_idle().await?;
            engine.dispatch(Message::PruneWorkstreams).await?;
            engine.wait_idle().await?;

            let mut reported = false;
            while let Ok(event) = events.try_recv() {
                if let EngineEvent::Notice {
                    notice:
                        Notice::Pruned {
                            workstreams,
                            containers,
                        },
                    ..
                } = event
                {
                    println!("pruned {workstreams} workstreams and {containers} containers");
                    reported = true;
                }
            }
            if !reported {
                tracing::warn!("prune finished without a report");
            }
        }
    }
    Ok(())
}
