//! Ronda CLI - Record incidents offline and sync them to the central registry
//!
//! Every save lands in the local outbox first; `ronda sync` and `ronda run`
//! push pending incidents whenever the remote store is reachable.

mod cli;
mod commands;
mod error;

use clap::Parser;
use ronda_core::config::SyncSettings;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::audit::run_audit;
use crate::commands::common::resolve_db_path;
use crate::commands::pending::run_pending;
use crate::commands::run::run_daemon;
use crate::commands::save::run_save;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ronda=info,ronda_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let settings = SyncSettings::from_env()?;
    tracing::debug!("Loaded sync settings: {:?}", settings);

    match cli.command {
        Commands::Save {
            payload,
            id,
            offline,
        } => {
            run_save(
                payload.as_deref(),
                id.as_deref(),
                offline,
                &settings,
                &db_path,
            )
            .await?;
        }
        Commands::Sync { json } => run_sync(json, &settings, &db_path).await?,
        Commands::Pending { json } => run_pending(json, &db_path).await?,
        Commands::Status { id } => run_status(&id, &db_path).await?,
        Commands::Audit { limit, json } => run_audit(limit, json, &db_path).await?,
        Commands::Run => run_daemon(&settings, &db_path).await?,
    }

    Ok(())
}
