use std::path::Path;
use std::sync::Arc;

use ronda_core::config::SyncSettings;
use ronda_core::sync::AlwaysOnline;

use crate::commands::common::{build_engine, format_summary, open_outbox, require_engine};
use crate::error::CliError;

pub async fn run_sync(as_json: bool, settings: &SyncSettings, db_path: &Path) -> Result<(), CliError> {
    let outbox = open_outbox(db_path).await?;
    let engine = require_engine(build_engine(&outbox, settings, Arc::new(AlwaysOnline))?)?;

    let summary = engine.trigger_sync().await;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_summary(&summary));
    }
    Ok(())
}
