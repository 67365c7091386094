//! Incident entry point used by clients.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Local};
use tokio::sync::Mutex;

use super::LocalOutbox;
use crate::models::{IncidentId, IncidentRecord, SyncState};
use crate::sequence::next_code;
use crate::sync::{SyncHandle, SyncSummary, SyncTrigger};
use crate::{Error, Result};

/// Saves incidents locally and hands them to the sync scheduler.
///
/// Saving never waits on the network: the record is durable in the outbox
/// before [`IncidentService::save_incident`] returns.
#[derive(Clone)]
pub struct IncidentService {
    outbox: LocalOutbox,
    sync: Option<SyncHandle>,
    /// Serializes code allocation so concurrent saves on one client never
    /// pick the same tentative code
    save_lock: Arc<Mutex<()>>,
}

impl IncidentService {
    /// Service without a sync scheduler; records only accumulate locally.
    pub fn offline(outbox: LocalOutbox) -> Self {
        Self {
            outbox,
            sync: None,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_sync(outbox: LocalOutbox, sync: SyncHandle) -> Self {
        Self {
            sync: Some(sync),
            ..Self::offline(outbox)
        }
    }

    pub const fn outbox(&self) -> &LocalOutbox {
        &self.outbox
    }

    pub async fn save_incident(
        &self,
        payload: serde_json::Value,
        existing_id: Option<IncidentId>,
    ) -> Result<IncidentRecord> {
        self.save_incident_at(payload, existing_id, Local::now()).await
    }

    /// Save with an explicit clock, which decides the code year for new records.
    pub async fn save_incident_at(
        &self,
        payload: serde_json::Value,
        existing_id: Option<IncidentId>,
        now: DateTime<Local>,
    ) -> Result<IncidentRecord> {
        if !payload.is_object() {
            return Err(Error::InvalidInput(
                "incident payload must be a JSON object".to_string(),
            ));
        }

        let guard = self.save_lock.lock().await;
        let record = match existing_id {
            Some(id) => self.edit_record(id, payload).await?,
            None => {
                let year = now.year();
                let known = self.outbox.known_codes(year).await?;
                let code = next_code(&known, year).ok_or_else(|| {
                    Error::InvalidInput(format!("incident numbering for {year} is exhausted"))
                })?;
                IncidentRecord {
                    created_at_local: now.timestamp_millis(),
                    ..IncidentRecord::new(code, payload)
                }
            }
        };

        let stored = self.outbox.enqueue(&record).await?;
        drop(guard);

        tracing::info!(
            "Saved incident {} as {}{}",
            stored.id,
            stored.code,
            if stored.is_edit { " (edit)" } else { "" }
        );
        if let Some(sync) = &self.sync {
            sync.kick(SyncTrigger::Save);
        }
        Ok(stored)
    }

    async fn edit_record(&self, id: IncidentId, payload: serde_json::Value) -> Result<IncidentRecord> {
        if let Some(entry) = self.outbox.get(&id).await? {
            return Ok(IncidentRecord {
                payload,
                ..entry.record
            });
        }
        if let Some(synced) = self.outbox.cached(&id).await? {
            return Ok(IncidentRecord {
                payload,
                is_edit: true,
                ..synced
            });
        }
        Err(Error::NotFound(id.to_string()))
    }

    /// Drain now and report what happened; never fails.
    pub async fn trigger_sync(&self) -> SyncSummary {
        match &self.sync {
            Some(sync) => sync.trigger_sync().await,
            None => {
                tracing::warn!("Sync requested but no remote store is configured");
                SyncSummary {
                    pending: self.pending_count().await,
                    stopped: Some(crate::sync::StopReason::NoRemote),
                    ..SyncSummary::default()
                }
            }
        }
    }

    pub async fn pending_count(&self) -> usize {
        match self.outbox.pending_count().await {
            Ok(count) => count,
            Err(error) => {
                tracing::error!("Failed to count pending incidents: {}", error);
                0
            }
        }
    }

    /// `None` when the id is in neither the outbox nor the synced cache.
    pub async fn sync_state(&self, id: &IncidentId) -> Result<Option<SyncState>> {
        if self.outbox.get(id).await?.is_some() {
            return Ok(Some(SyncState::Unsynced));
        }
        if self.outbox.cached(id).await?.is_some() {
            return Ok(Some(SyncState::Synced));
        }
        Ok(None)
    }
}
