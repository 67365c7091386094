//! Connection setup for the local outbox database.

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

const MEMORY_PATH: &str = ":memory:";

/// Local libSQL file holding the outbox, synced cache and audit log.
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and bring its schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(&path.as_ref().to_string_lossy()).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::connect(MEMORY_PATH).await
    }

    async fn connect(location: &str) -> Result<Self> {
        let db = Builder::new_local(location).build().await?;
        let conn = db.connect()?;
        apply_pragmas(&conn).await?;
        migrations::run(&conn).await?;
        Ok(Self { _db: db, conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

async fn apply_pragmas(conn: &Connection) -> Result<()> {
    // journal_mode answers with a row and is unsupported for :memory:
    if let Err(error) = conn.query("PRAGMA journal_mode = WAL", ()).await {
        tracing::debug!("WAL journal mode unavailable: {}", error);
    }
    // a queued incident must survive power loss once enqueue returns
    if let Err(error) = conn.execute("PRAGMA synchronous = FULL", ()).await {
        tracing::warn!(
            "Could not set synchronous = FULL; queued incidents may not survive power loss: {}",
            error
        );
    }
    conn.execute("PRAGMA foreign_keys = ON", ()).await?;
    Ok(())
}
