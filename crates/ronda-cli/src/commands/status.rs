use std::path::Path;

use ronda_core::models::SyncState;
use ronda_core::services::IncidentService;

use crate::commands::common::{open_outbox, parse_incident_id};
use crate::error::CliError;

pub async fn run_status(id: &str, db_path: &Path) -> Result<(), CliError> {
    let id = parse_incident_id(id)?;
    let outbox = open_outbox(db_path).await?;
    let service = IncidentService::offline(outbox.clone());

    match service.sync_state(&id).await? {
        Some(SyncState::Unsynced) => {
            let code = outbox
                .get(&id)
                .await?
                .map(|entry| entry.record.code.to_string())
                .unwrap_or_default();
            println!("unsynced\t{code}");
        }
        Some(SyncState::Synced) => {
            let code = outbox
                .cached(&id)
                .await?
                .map(|record| record.code.to_string())
                .unwrap_or_default();
            println!("synced\t{code}");
        }
        None => println!("unknown"),
    }
    Ok(())
}
