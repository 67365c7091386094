//! Outbox drain: checking, collision resolution, and remote writes.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use super::audit::AuditLog;
use super::connectivity::ConnectivityStatus;
use crate::config::SyncSettings;
use crate::models::{AuditEvent, IncidentRecord, OutboxEntry};
use crate::remote::{RemoteError, RemoteIncidentStore};
use crate::sequence::reallocate;
use crate::services::LocalOutbox;
use crate::util::unix_millis_now;

/// What started a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Boot,
    Reconnected,
    Heartbeat,
    Manual,
    Save,
}

impl SyncTrigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Reconnected => "reconnected",
            Self::Heartbeat => "heartbeat",
            Self::Manual => "manual",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a drain ended before the queue was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Connectivity reported offline between records
    Offline,
    /// A remote call failed transiently; later records wait for the next trigger
    Transient,
    /// The local database failed to read or write
    LocalStorage,
    /// Another drain held the single-flight guard
    AlreadyDraining,
    /// Shutdown was requested between records
    Shutdown,
    /// No remote store is configured
    NoRemote,
}

impl StopReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Transient => "transient",
            Self::LocalStorage => "local_storage",
            Self::AlreadyDraining => "already_draining",
            Self::Shutdown => "shutdown",
            Self::NoRemote => "no_remote",
        }
    }
}

/// Outcome of one drain, always returned instead of an error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub synced: usize,
    pub rejected: usize,
    pub reallocated: usize,
    /// Rejected records skipped while their cooldown runs
    pub deferred: usize,
    pub pending: usize,
    pub stopped: Option<StopReason>,
}

type Flow = ControlFlow<StopReason>;

struct EngineInner {
    outbox: LocalOutbox,
    remote: Arc<dyn RemoteIncidentStore>,
    connectivity: Arc<dyn ConnectivityStatus>,
    audit: Arc<dyn AuditLog>,
    rejection_cooldown: Duration,
    drain_guard: Mutex<()>,
    stop_requested: AtomicBool,
}

/// Drains the local outbox into the remote store, one record at a time.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        outbox: LocalOutbox,
        remote: Arc<dyn RemoteIncidentStore>,
        connectivity: Arc<dyn ConnectivityStatus>,
        audit: Arc<dyn AuditLog>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                outbox,
                remote,
                connectivity,
                audit,
                rejection_cooldown: settings.rejection_cooldown,
                drain_guard: Mutex::new(()),
                stop_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn outbox(&self) -> &LocalOutbox {
        &self.inner.outbox
    }

    pub fn remote(&self) -> Arc<dyn RemoteIncidentStore> {
        Arc::clone(&self.inner.remote)
    }

    /// Whether a drain currently holds the single-flight guard
    pub fn is_draining(&self) -> bool {
        self.inner.drain_guard.try_lock().is_err()
    }

    /// Ask any running drain to stop after its current record.
    pub fn request_stop(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Manual "sync now".
    pub async fn trigger_sync(&self) -> SyncSummary {
        self.drain(SyncTrigger::Manual).await
    }

    pub async fn pending_count(&self) -> usize {
        match self.inner.outbox.pending_count().await {
            Ok(count) => count,
            Err(error) => {
                tracing::error!("Failed to count pending incidents: {}", error);
                0
            }
        }
    }

    /// Run one drain pass over the outbox in FIFO order.
    ///
    /// Returns immediately with `AlreadyDraining` when another pass is running.
    pub async fn drain(&self, trigger: SyncTrigger) -> SyncSummary {
        let Ok(_guard) = self.inner.drain_guard.try_lock() else {
            tracing::debug!("Drain ({}) skipped: another drain is running", trigger);
            return SyncSummary {
                pending: self.pending_count().await,
                stopped: Some(StopReason::AlreadyDraining),
                ..SyncSummary::default()
            };
        };

        let mut summary = SyncSummary::default();
        let entries = match self.inner.outbox.entries().await {
            Ok(entries) => entries,
            Err(error) => {
                tracing::error!("Failed to read outbox: {}", error);
                summary.stopped = Some(StopReason::LocalStorage);
                return summary;
            }
        };
        if entries.is_empty() {
            return summary;
        }

        tracing::info!(
            "Draining {} pending incident(s) (trigger: {})",
            entries.len(),
            trigger
        );

        let now = unix_millis_now();
        let cooldown_ms = i64::try_from(self.inner.rejection_cooldown.as_millis()).unwrap_or(i64::MAX);

        for entry in entries {
            if self.inner.stop_requested.load(Ordering::SeqCst) {
                summary.stopped = Some(StopReason::Shutdown);
                break;
            }
            if !self.inner.connectivity.is_online() {
                tracing::info!("Offline; leaving remaining incidents queued");
                summary.stopped = Some(StopReason::Offline);
                break;
            }
            if entry.is_cooling_down(now, cooldown_ms) {
                tracing::debug!(
                    "Skipping rejected incident {} until its cooldown ends",
                    entry.record.id
                );
                summary.deferred += 1;
                continue;
            }

            if let ControlFlow::Break(reason) = self.process_record(entry, &mut summary).await {
                summary.stopped = Some(reason);
                break;
            }
        }

        summary.pending = self.pending_count().await;
        self.inner
            .audit
            .record(AuditEvent::BatchCompleted {
                trigger: trigger.as_str().to_string(),
                synced: summary.synced,
                rejected: summary.rejected,
                reallocated: summary.reallocated,
                pending: summary.pending,
                stopped: summary.stopped.map(|reason| reason.as_str().to_string()),
            })
            .await;

        tracing::info!(
            "Drain finished: {} synced, {} rejected, {} reallocated, {} pending{}",
            summary.synced,
            summary.rejected,
            summary.reallocated,
            summary.pending,
            summary
                .stopped
                .map(|reason| format!(" (stopped: {})", reason.as_str()))
                .unwrap_or_default()
        );
        summary
    }

    /// Checking -> Resolving? -> Writing for a single record.
    ///
    /// Outbox updates are conditioned on `entry.revision`, so a save that
    /// rewrites the record mid-flight is never overwritten or dequeued.
    async fn process_record(&self, entry: OutboxEntry, summary: &mut SyncSummary) -> Flow {
        let OutboxEntry {
            mut record,
            revision,
            ..
        } = entry;

        match self.inner.remote.find_by_code(&record.code).await {
            Ok(Some(holder)) if holder.id != record.id => {
                if let Err(flow) = self
                    .resolve_collision(&mut record, revision, &holder, summary)
                    .await
                {
                    return flow;
                }
            }
            Ok(_) => {}
            Err(error) => return lookup_failure(&record, &error),
        }

        match self.inner.remote.upsert(&record).await {
            Ok(()) => {
                match self
                    .inner
                    .outbox
                    .confirm_synced(&record, revision, unix_millis_now())
                    .await
                {
                    Ok(true) => {
                        tracing::debug!("Synced incident {} as {}", record.id, record.code);
                    }
                    Ok(false) => {
                        tracing::info!(
                            "Incident {} changed while it was being synced; the newer version stays queued",
                            record.id
                        );
                    }
                    Err(error) => {
                        tracing::error!(
                            "Incident {} was written remotely but could not be dequeued: {}",
                            record.id,
                            error
                        );
                        return ControlFlow::Break(StopReason::LocalStorage);
                    }
                }
                summary.synced += 1;
                ControlFlow::Continue(())
            }
            Err(error) => self.write_failure(&record, revision, error, summary).await,
        }
    }

    /// Renumber `record` past every code either side knows for its year.
    ///
    /// The new code is persisted before the remote write is attempted.
    async fn resolve_collision(
        &self,
        record: &mut IncidentRecord,
        revision: i64,
        holder: &IncidentRecord,
        summary: &mut SyncSummary,
    ) -> Result<(), Flow> {
        let year = record.year();
        let remote_codes = match self.inner.remote.list_codes_for_year(year).await {
            Ok(codes) => codes,
            Err(error) => return Err(lookup_failure(record, &error)),
        };
        let local_codes = self.inner.outbox.known_codes(year).await.map_err(|error| {
            tracing::error!("Failed to read local codes for {}: {}", year, error);
            ControlFlow::Break(StopReason::LocalStorage)
        })?;

        let old_code = record.code;
        let Some(new_code) = reallocate(&record.id, &local_codes, &remote_codes, year) else {
            let reason = format!("no incident code left in {year} after {old_code} collided");
            return Err(self
                .write_failure(record, revision, RemoteError::Rejected(reason), summary)
                .await);
        };

        match self
            .inner
            .outbox
            .reassign_code(&record.id, &new_code, revision)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(
                    "Incident {} changed before its new code was stored; retrying next drain",
                    record.id
                );
                return Err(ControlFlow::Continue(()));
            }
            Err(error) => {
                tracing::error!(
                    "Failed to persist reallocated code for incident {}: {}",
                    record.id,
                    error
                );
                return Err(ControlFlow::Break(StopReason::LocalStorage));
            }
        }
        record.code = new_code;

        tracing::info!(
            "Code collision on {}: incident {} renumbered to {}",
            old_code,
            record.id,
            record.code
        );
        summary.reallocated += 1;
        self.inner
            .audit
            .record(AuditEvent::CodeReallocated {
                record_id: record.id,
                old_code,
                new_code: record.code,
                cause: format!("code {old_code} is already held by incident {}", holder.id),
            })
            .await;
        Ok(())
    }

    /// A failed upsert: transient errors end the batch, rejections flag the record.
    async fn write_failure(
        &self,
        record: &IncidentRecord,
        revision: i64,
        error: RemoteError,
        summary: &mut SyncSummary,
    ) -> Flow {
        match error {
            RemoteError::Transient(reason) => {
                tracing::warn!(
                    "Remote store unavailable while syncing incident {}: {}",
                    record.id,
                    reason
                );
                ControlFlow::Break(StopReason::Transient)
            }
            RemoteError::Rejected(reason) => {
                tracing::warn!(
                    "Remote store rejected incident {} ({}): {}",
                    record.id,
                    record.code,
                    reason
                );
                match self
                    .inner
                    .outbox
                    .mark_rejected(&record.id, &reason, unix_millis_now(), revision)
                    .await
                {
                    Ok(flagged) => {
                        if flagged {
                            summary.rejected += 1;
                        } else {
                            tracing::info!(
                                "Incident {} changed after it was sent; not flagging the newer version",
                                record.id
                            );
                        }
                        ControlFlow::Continue(())
                    }
                    Err(error) => {
                        tracing::error!(
                            "Failed to flag rejected incident {}: {}",
                            record.id,
                            error
                        );
                        ControlFlow::Break(StopReason::LocalStorage)
                    }
                }
            }
        }
    }
}

/// A failed code lookup says nothing about the record itself, so the batch
/// stops and the record keeps its place.
fn lookup_failure(record: &IncidentRecord, error: &RemoteError) -> Flow {
    match error {
        RemoteError::Transient(reason) => tracing::warn!(
            "Remote store unavailable while checking incident {}: {}",
            record.id,
            reason
        ),
        RemoteError::Rejected(reason) => tracing::error!(
            "Remote store refused a code lookup for incident {}: {}",
            record.id,
            reason
        ),
    }
    ControlFlow::Break(StopReason::Transient)
}
