use std::path::Path;
use std::sync::Arc;

use ronda_core::config::SyncSettings;
use ronda_core::services::IncidentService;
use ronda_core::sync::{AlwaysOnline, SyncTrigger};

use crate::commands::common::{
    build_engine, format_summary, open_outbox, parse_incident_id, resolve_payload,
};
use crate::error::CliError;

pub async fn run_save(
    payload: Option<&str>,
    id: Option<&str>,
    offline: bool,
    settings: &SyncSettings,
    db_path: &Path,
) -> Result<(), CliError> {
    let payload = resolve_payload(payload)?;
    let existing_id = id.map(parse_incident_id).transpose()?;

    let outbox = open_outbox(db_path).await?;
    let service = IncidentService::offline(outbox.clone());
    let record = match service.save_incident(payload, existing_id).await {
        Err(ronda_core::Error::NotFound(missing)) => {
            return Err(CliError::IncidentNotFound(missing));
        }
        other => other?,
    };

    println!("{}\t{}", record.id, record.code);

    if offline {
        return Ok(());
    }
    if let Some(engine) = build_engine(&outbox, settings, Arc::new(AlwaysOnline))? {
        let summary = engine.drain(SyncTrigger::Save).await;
        eprintln!("{}", format_summary(&summary));
    }
    Ok(())
}
