//! Durable local outbox shared by the incident service and the sync engine.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    AuditRepository, Database, LibSqlAuditRepository, LibSqlOutboxRepository,
    LibSqlSyncedCacheRepository, OutboxRepository, SyncedCacheRepository,
};
use crate::models::{AuditEntry, IncidentCode, IncidentId, IncidentRecord, OutboxEntry};
use crate::Result;

/// Thread-safe handle over the local database.
///
/// Every mutating call has been written to the database file by the time it
/// returns, so the queue survives process restarts.
#[derive(Clone)]
pub struct LocalOutbox {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalOutbox {
    /// Open the outbox at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::debug!("Opened local outbox at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory outbox (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, `None` for in-memory outboxes.
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Insert or replace a pending record by id.
    ///
    /// Replacing keeps the original `created_at_local`.
    pub async fn enqueue(&self, record: &IncidentRecord) -> Result<IncidentRecord> {
        let db = self.db.lock().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        repo.enqueue(record).await
    }

    /// Remove a pending record. Absent ids are a no-op.
    pub async fn dequeue(&self, id: &IncidentId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        if !repo.dequeue(id).await? {
            tracing::debug!("Dequeue of {} ignored: not in outbox", id);
        }
        Ok(())
    }

    /// Pending records, oldest local creation first.
    pub async fn list(&self) -> Result<Vec<IncidentRecord>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|entry| entry.record)
            .collect())
    }

    /// Pending records with their rejection bookkeeping, in drain order.
    pub async fn entries(&self) -> Result<Vec<OutboxEntry>> {
        let db = self.db.lock().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        repo.entries().await
    }

    /// Fetch one pending entry.
    pub async fn get(&self, id: &IncidentId) -> Result<Option<OutboxEntry>> {
        let db = self.db.lock().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        repo.get(id).await
    }

    /// Flag a pending record as rejected by the remote store.
    ///
    /// Returns `false` without flagging when the record was rewritten after
    /// `revision` was read, since the rejection was for the older content.
    pub async fn mark_rejected(
        &self,
        id: &IncidentId,
        reason: &str,
        rejected_at: i64,
        revision: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        repo.mark_rejected(id, reason, rejected_at, revision).await
    }

    /// Persist a reallocated code, touching nothing else on the row.
    pub async fn reassign_code(
        &self,
        id: &IncidentId,
        code: &IncidentCode,
        revision: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        repo.reassign_code(id, code, revision).await
    }

    /// Number of records waiting for remote confirmation.
    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        repo.count().await
    }

    /// Every code for `year` visible locally: pending plus cached synced records.
    pub async fn known_codes(&self, year: i32) -> Result<BTreeSet<String>> {
        let db = self.db.lock().await;
        let outbox = LibSqlOutboxRepository::new(db.connection());
        let cache = LibSqlSyncedCacheRepository::new(db.connection());

        let mut codes: BTreeSet<String> = outbox.codes_for_year(year).await?.into_iter().collect();
        codes.extend(cache.codes_for_year(year).await?);
        Ok(codes)
    }

    /// Cache a record the remote store accepted and dequeue it.
    ///
    /// The outbox row is only removed while it is still at `revision`. A
    /// rewrite that landed during the remote write stays queued, and the
    /// return value is `false`.
    pub async fn confirm_synced(
        &self,
        record: &IncidentRecord,
        revision: i64,
        synced_at: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN TRANSACTION", ()).await?;

        let result = async {
            LibSqlSyncedCacheRepository::new(conn)
                .store(record, synced_at)
                .await?;
            LibSqlOutboxRepository::new(conn)
                .dequeue_revision(&record.id, revision)
                .await
        }
        .await;

        let dequeued = match result {
            Ok(dequeued) => dequeued,
            Err(error) => {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error);
            }
        };
        if let Err(error) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }
        Ok(dequeued)
    }

    /// Locally cached copy of a synced record.
    pub async fn cached(&self, id: &IncidentId) -> Result<Option<IncidentRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncedCacheRepository::new(db.connection());
        repo.get(id).await
    }

    /// Persist an audit entry.
    pub async fn append_audit(&self, entry: &AuditEntry) -> Result<i64> {
        let db = self.db.lock().await;
        let repo = LibSqlAuditRepository::new(db.connection());
        repo.append(entry).await
    }

    /// Recent audit entries, newest first.
    pub async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let db = self.db.lock().await;
        let repo = LibSqlAuditRepository::new(db.connection());
        repo.recent(limit).await
    }
}
