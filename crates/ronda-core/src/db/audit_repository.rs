//! Audit log repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{AuditEntry, AuditEvent};

/// Trait for audit log storage operations (async)
#[allow(async_fn_in_trait)]
pub trait AuditRepository {
    /// Append an entry, returning its row id
    async fn append(&self, entry: &AuditEntry) -> Result<i64>;

    /// Most recent entries, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>>;
}

/// libSQL implementation of `AuditRepository`
pub struct LibSqlAuditRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlAuditRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl AuditRepository for LibSqlAuditRepository<'_> {
    async fn append(&self, entry: &AuditEntry) -> Result<i64> {
        let event = serde_json::to_string(&entry.event)?;
        self.conn
            .execute(
                "INSERT INTO sync_audit (kind, event, recorded_at) VALUES (?, ?, ?)",
                params![entry.event.kind(), event, entry.recorded_at],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, event, recorded_at FROM sync_audit
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            let event: String = row.get(1)?;
            entries.push(AuditEntry {
                id: row.get(0)?,
                event: serde_json::from_str::<AuditEvent>(&event)?,
                recorded_at: row.get(2)?,
            });
        }
        Ok(entries)
    }
}
