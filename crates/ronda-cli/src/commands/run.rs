use std::path::Path;
use std::sync::Arc;

use ronda_core::config::SyncSettings;
use ronda_core::sync::{spawn_probe, start_background, ConnectivityMonitor};

use crate::commands::common::{build_engine, open_outbox, require_engine};
use crate::error::CliError;

/// Boot drain, heartbeat, and reconnect drains until Ctrl-C.
pub async fn run_daemon(settings: &SyncSettings, db_path: &Path) -> Result<(), CliError> {
    let outbox = open_outbox(db_path).await?;
    let monitor = ConnectivityMonitor::new(true);
    let engine = require_engine(build_engine(
        &outbox,
        settings,
        Arc::new(monitor.clone()),
    )?)?;

    let probe = spawn_probe(engine.remote(), monitor.clone(), settings.probe_interval);
    let (handle, worker) = start_background(
        engine,
        Some(monitor.subscribe()),
        settings.heartbeat_interval,
    );
    println!(
        "Syncing {} pending incident(s); press Ctrl-C to stop",
        handle.pending_count().await
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down sync loop");
    handle.shutdown().await;
    worker.join().await;
    probe.abort();

    println!("{} incident(s) still pending", handle.pending_count().await);
    Ok(())
}
