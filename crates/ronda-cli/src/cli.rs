use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ronda")]
#[command(about = "Record incidents offline and sync them to the central registry")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local outbox database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save an incident locally (JSON object argument, or `-` for stdin)
    Save {
        /// Incident payload as a JSON object
        payload: Option<String>,
        /// Edit an existing incident instead of creating one
        #[arg(long, value_name = "ID")]
        id: Option<String>,
        /// Skip the sync attempt after saving
        #[arg(long)]
        offline: bool,
    },
    /// Push pending incidents to the central registry now
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show incidents waiting to be synced
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show whether an incident has reached the central registry
    Status {
        /// Incident ID
        id: String,
    },
    /// List recent sync audit entries
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the background sync loop until interrupted
    Run,
}
