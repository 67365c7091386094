use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::commands::common::{format_pending_lines, open_outbox, pending_to_item, PendingItem};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct PendingReport {
    count: usize,
    incidents: Vec<PendingItem>,
}

pub async fn run_pending(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let outbox = open_outbox(db_path).await?;
    let entries = outbox.entries().await?;
    let now_ms = Utc::now().timestamp_millis();

    if as_json {
        let report = PendingReport {
            count: entries.len(),
            incidents: entries
                .iter()
                .map(|entry| pending_to_item(entry, now_ms))
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} pending", entries.len());
    for line in format_pending_lines(&entries, now_ms) {
        println!("{line}");
    }
    Ok(())
}
