use std::path::Path;

use crate::commands::common::{audit_to_item, format_audit_lines, open_outbox, AuditItem};
use crate::error::CliError;

pub async fn run_audit(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let outbox = open_outbox(db_path).await?;
    let entries = outbox.recent_audit(limit).await?;

    if as_json {
        let json_items = entries.iter().map(audit_to_item).collect::<Vec<AuditItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No sync activity recorded.");
        return Ok(());
    }

    for line in format_audit_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}
