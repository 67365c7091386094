//! Outbox repository implementation

use libsql::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{IncidentCode, IncidentId, IncidentRecord, OutboxEntry, Rejection};

/// Trait for outbox storage operations (async)
#[allow(async_fn_in_trait)]
pub trait OutboxRepository {
    /// Insert or replace a pending record by id, returning the stored record
    async fn enqueue(&self, record: &IncidentRecord) -> Result<IncidentRecord>;

    /// Remove a pending record; returns whether a row was removed
    async fn dequeue(&self, id: &IncidentId) -> Result<bool>;

    /// Remove a pending record only while it is still at `revision`
    async fn dequeue_revision(&self, id: &IncidentId, revision: i64) -> Result<bool>;

    /// Move a pending record to a new code, unless it was rewritten since `revision`
    async fn reassign_code(&self, id: &IncidentId, code: &IncidentCode, revision: i64)
        -> Result<bool>;

    /// Fetch one pending entry
    async fn get(&self, id: &IncidentId) -> Result<Option<OutboxEntry>>;

    /// All pending entries, oldest local creation first
    async fn entries(&self) -> Result<Vec<OutboxEntry>>;

    /// Record a remote rejection against `revision` of a pending record
    async fn mark_rejected(
        &self,
        id: &IncidentId,
        reason: &str,
        rejected_at: i64,
        revision: i64,
    ) -> Result<bool>;

    /// Number of pending records
    async fn count(&self) -> Result<usize>;

    /// Codes of pending records stamped in `year`
    async fn codes_for_year(&self, year: i32) -> Result<Vec<String>>;
}

/// libSQL implementation of `OutboxRepository`
pub struct LibSqlOutboxRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlOutboxRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &Row) -> Result<OutboxEntry> {
        let record = parse_record(row)?;
        let reason: Option<String> = row.get(5)?;
        let rejected_at: Option<i64> = row.get(6)?;
        let count: i64 = row.get(7)?;
        let revision: i64 = row.get(8)?;

        let rejection = match (reason, rejected_at) {
            (Some(reason), Some(rejected_at)) => Some(Rejection {
                reason,
                rejected_at,
                count: u32::try_from(count).unwrap_or(u32::MAX),
            }),
            _ => None,
        };

        Ok(OutboxEntry {
            record,
            rejection,
            revision,
        })
    }
}

const ENTRY_COLUMNS: &str = "id, code, created_at_local, payload, is_edit, \
     rejection_reason, rejected_at, rejection_count, revision";

impl OutboxRepository for LibSqlOutboxRepository<'_> {
    async fn enqueue(&self, record: &IncidentRecord) -> Result<IncidentRecord> {
        let payload = serde_json::to_string(&record.payload)?;

        // A replace keeps the first created_at_local
        self.conn
            .execute(
                "INSERT INTO outbox (id, code, code_year, created_at_local, payload, is_edit)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     code = excluded.code,
                     code_year = excluded.code_year,
                     payload = excluded.payload,
                     is_edit = excluded.is_edit,
                     rejection_reason = NULL,
                     rejected_at = NULL,
                     rejection_count = 0,
                     revision = outbox.revision + 1",
                params![
                    record.id.as_str(),
                    record.code.to_string(),
                    i64::from(record.code.year),
                    record.created_at_local,
                    payload,
                    i64::from(record.is_edit)
                ],
            )
            .await?;

        self.get(&record.id)
            .await?
            .map(|entry| entry.record)
            .ok_or_else(|| Error::Database(format!("outbox lost incident {}", record.id)))
    }

    async fn dequeue(&self, id: &IncidentId) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM outbox WHERE id = ?", [id.as_str()])
            .await?;
        Ok(removed > 0)
    }

    async fn dequeue_revision(&self, id: &IncidentId, revision: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM outbox WHERE id = ? AND revision = ?",
                params![id.as_str(), revision],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn reassign_code(
        &self,
        id: &IncidentId,
        code: &IncidentCode,
        revision: i64,
    ) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE outbox SET code = ?, code_year = ? WHERE id = ? AND revision = ?",
                params![
                    code.to_string(),
                    i64::from(code.year),
                    id.as_str(),
                    revision
                ],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn get(&self, id: &IncidentId) -> Result<Option<OutboxEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM outbox WHERE id = ?"),
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn entries(&self) -> Result<Vec<OutboxEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM outbox ORDER BY created_at_local ASC, seq ASC"
                ),
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn mark_rejected(
        &self,
        id: &IncidentId,
        reason: &str,
        rejected_at: i64,
        revision: i64,
    ) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE outbox
                 SET rejection_reason = ?, rejected_at = ?, rejection_count = rejection_count + 1
                 WHERE id = ? AND revision = ?",
                params![reason, rejected_at, id.as_str(), revision],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM outbox", ()).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn codes_for_year(&self, year: i32) -> Result<Vec<String>> {
        collect_codes(self.conn, "SELECT code FROM outbox WHERE code_year = ?", year).await
    }
}

/// Parse the leading `id, code, created_at_local, payload, is_edit` columns
pub(super) fn parse_record(row: &Row) -> Result<IncidentRecord> {
    let id: String = row.get(0)?;
    let code: String = row.get(1)?;
    let payload: String = row.get(3)?;

    Ok(IncidentRecord {
        id: id
            .parse::<IncidentId>()
            .map_err(|_| Error::Database(format!("invalid incident id in outbox: {id}")))?,
        code: code.parse::<IncidentCode>().map_err(Error::Database)?,
        created_at_local: row.get(2)?,
        payload: serde_json::from_str(&payload)?,
        is_edit: row.get::<i64>(4)? != 0,
    })
}

pub(super) async fn collect_codes(conn: &Connection, sql: &str, year: i32) -> Result<Vec<String>> {
    let mut rows = conn.query(sql, [i64::from(year)]).await?;
    let mut codes = Vec::new();
    while let Some(row) = rows.next().await? {
        codes.push(row.get::<String>(0)?);
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn record_at(number: u32, created_at_local: i64) -> IncidentRecord {
        IncidentRecord {
            created_at_local,
            ..IncidentRecord::new(IncidentCode::new(number, 2025), json!({"n": number}))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_and_get() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let record = record_at(1, 100);
        let stored = repo.enqueue(&record).await.unwrap();
        assert_eq!(stored, record);

        let entry = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(entry.record, record);
        assert!(entry.rejection.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replace_preserves_created_at_local() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let record = record_at(1, 100);
        repo.enqueue(&record).await.unwrap();

        let replacement = IncidentRecord {
            code: IncidentCode::new(4, 2025),
            created_at_local: 999,
            payload: json!({"n": "changed"}),
            ..record.clone()
        };
        let stored = repo.enqueue(&replacement).await.unwrap();

        assert_eq!(stored.created_at_local, 100);
        assert_eq!(stored.code, IncidentCode::new(4, 2025));
        assert_eq!(stored.payload, json!({"n": "changed"}));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dequeue_is_idempotent() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let record = record_at(1, 100);
        repo.enqueue(&record).await.unwrap();

        assert!(repo.dequeue(&record.id).await.unwrap());
        assert!(!repo.dequeue(&record.id).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_entries_are_fifo_by_creation_time() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let late = record_at(3, 300);
        let early = record_at(1, 100);
        let tie_first = record_at(2, 200);
        let tie_second = record_at(5, 200);

        for record in [&late, &early, &tie_first, &tie_second] {
            repo.enqueue(record).await.unwrap();
        }

        let order: Vec<IncidentId> = repo
            .entries()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.record.id)
            .collect();
        assert_eq!(order, vec![early.id, tie_first.id, tie_second.id, late.id]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_rejected_and_reset_on_replace() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let record = record_at(1, 100);
        repo.enqueue(&record).await.unwrap();
        assert!(repo
            .mark_rejected(&record.id, "missing field", 5_000, 0)
            .await
            .unwrap());
        assert!(repo
            .mark_rejected(&record.id, "missing field", 6_000, 0)
            .await
            .unwrap());

        let rejection = repo.get(&record.id).await.unwrap().unwrap().rejection.unwrap();
        assert_eq!(rejection.reason, "missing field");
        assert_eq!(rejection.rejected_at, 6_000);
        assert_eq!(rejection.count, 2);

        repo.enqueue(&record).await.unwrap();
        assert!(repo.get(&record.id).await.unwrap().unwrap().rejection.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_codes_for_year() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        repo.enqueue(&record_at(2, 1)).await.unwrap();
        repo.enqueue(&IncidentRecord::new(IncidentCode::new(8, 2024), json!({})))
            .await
            .unwrap();

        assert_eq!(repo.codes_for_year(2025).await.unwrap(), vec!["2/2025"]);
        assert_eq!(repo.codes_for_year(2024).await.unwrap(), vec!["8/2024"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rewrite_bumps_revision() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let record = record_at(1, 100);
        repo.enqueue(&record).await.unwrap();
        assert_eq!(repo.get(&record.id).await.unwrap().unwrap().revision, 0);

        repo.enqueue(&record).await.unwrap();
        assert_eq!(repo.get(&record.id).await.unwrap().unwrap().revision, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stale_revision_leaves_rewrite_queued() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let record = record_at(5, 100);
        repo.enqueue(&record).await.unwrap();
        let edited = IncidentRecord {
            payload: json!({"status": "closed"}),
            ..record.clone()
        };
        repo.enqueue(&edited).await.unwrap();

        let stale = 0;
        assert!(!repo
            .reassign_code(&record.id, &IncidentCode::new(6, 2025), stale)
            .await
            .unwrap());
        assert!(!repo
            .mark_rejected(&record.id, "missing field", 1_000, stale)
            .await
            .unwrap());
        assert!(!repo.dequeue_revision(&record.id, stale).await.unwrap());

        let entry = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(entry.record, edited);
        assert!(entry.rejection.is_none());

        assert!(repo
            .reassign_code(&record.id, &IncidentCode::new(6, 2025), entry.revision)
            .await
            .unwrap());
        let moved = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(moved.record.code, IncidentCode::new(6, 2025));
        assert_eq!(moved.record.payload, json!({"status": "closed"}));
        assert_eq!(moved.revision, entry.revision);
        assert_eq!(repo.codes_for_year(2025).await.unwrap(), vec!["6/2025"]);

        assert!(repo.dequeue_revision(&record.id, moved.revision).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
