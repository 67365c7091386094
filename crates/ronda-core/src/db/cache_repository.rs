//! Repository for local copies of records the remote store has accepted

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{IncidentId, IncidentRecord};

use super::outbox_repository::{collect_codes, parse_record};

/// Trait for synced-record cache operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncedCacheRepository {
    /// Store or refresh the confirmed copy of a record
    async fn store(&self, record: &IncidentRecord, synced_at: i64) -> Result<()>;

    /// Fetch the confirmed copy of a record
    async fn get(&self, id: &IncidentId) -> Result<Option<IncidentRecord>>;

    /// Codes of confirmed records stamped in `year`
    async fn codes_for_year(&self, year: i32) -> Result<Vec<String>>;
}

/// libSQL implementation of `SyncedCacheRepository`
pub struct LibSqlSyncedCacheRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncedCacheRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SyncedCacheRepository for LibSqlSyncedCacheRepository<'_> {
    async fn store(&self, record: &IncidentRecord, synced_at: i64) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO synced_incidents
                     (id, code, code_year, created_at_local, payload, is_edit, synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id.as_str(),
                    record.code.to_string(),
                    i64::from(record.code.year),
                    record.created_at_local,
                    payload,
                    i64::from(record.is_edit),
                    synced_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &IncidentId) -> Result<Option<IncidentRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, code, created_at_local, payload, is_edit
                 FROM synced_incidents WHERE id = ?",
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn codes_for_year(&self, year: i32) -> Result<Vec<String>> {
        collect_codes(
            self.conn,
            "SELECT code FROM synced_incidents WHERE code_year = ?",
            year,
        )
        .await
    }
}
