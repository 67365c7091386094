//! Schema migrations for the outbox database.

use crate::error::Result;
use libsql::Connection;

struct Migration {
    version: i32,
    label: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        label: "outbox and synced cache",
        statements: &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // seq breaks created_at_local ties in insertion order
            "CREATE TABLE IF NOT EXISTS outbox (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                code TEXT NOT NULL,
                code_year INTEGER NOT NULL,
                created_at_local INTEGER NOT NULL,
                payload TEXT NOT NULL,
                is_edit INTEGER NOT NULL DEFAULT 0,
                rejection_reason TEXT,
                rejected_at INTEGER,
                rejection_count INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_outbox_order ON outbox(created_at_local ASC, seq ASC)",
            "CREATE INDEX IF NOT EXISTS idx_outbox_year ON outbox(code_year)",
            "CREATE TABLE IF NOT EXISTS synced_incidents (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                code_year INTEGER NOT NULL,
                created_at_local INTEGER NOT NULL,
                payload TEXT NOT NULL,
                is_edit INTEGER NOT NULL DEFAULT 0,
                synced_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_synced_incidents_year ON synced_incidents(code_year)",
        ],
    },
    Migration {
        version: 2,
        label: "local audit log",
        statements: &[
            "CREATE TABLE IF NOT EXISTS sync_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                event TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_audit_recorded_at ON sync_audit(recorded_at DESC)",
        ],
    },
    Migration {
        version: 3,
        label: "outbox row revisions",
        statements: &[
            // Bumped on every local rewrite; a drain only settles the revision it sent
            "ALTER TABLE outbox ADD COLUMN revision INTEGER NOT NULL DEFAULT 0",
        ],
    },
];

/// Apply every migration newer than the stored schema version.
pub async fn run(conn: &Connection) -> Result<()> {
    let applied = schema_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration).await?;
        tracing::info!(
            version = migration.version,
            "Applied outbox migration: {}",
            migration.label
        );
    }

    Ok(())
}

async fn schema_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            (),
        )
        .await?;
    if rows.next().await?.is_none() {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT IFNULL(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i32>(0)?),
        None => Ok(0),
    }
}

/// Run one migration and record its version in a single transaction.
async fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute("BEGIN", ()).await?;

    let outcome = async {
        for statement in migration.statements {
            conn.execute(statement, ()).await?;
        }
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .await?;
        conn.execute("COMMIT", ()).await?;
        Ok::<(), libsql::Error>(())
    }
    .await;

    if let Err(error) = outcome {
        let _ = conn.execute("ROLLBACK", ()).await;
        return Err(error.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn memory_connection() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn has_table(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
            )
            .await
            .unwrap();
        rows.next().await.unwrap().is_some()
    }

    fn latest_version() -> i32 {
        MIGRATIONS.last().map_or(0, |migration| migration.version)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fresh_database_reaches_latest_version() {
        let conn = memory_connection().await;
        assert_eq!(schema_version(&conn).await.unwrap(), 0);

        run(&conn).await.unwrap();
        assert_eq!(schema_version(&conn).await.unwrap(), latest_version());

        for table in ["outbox", "synced_incidents", "sync_audit"] {
            assert!(has_table(&conn, table).await, "{table} missing");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rerunning_migrations_is_a_no_op() {
        let conn = memory_connection().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_version", ())
            .await
            .unwrap();
        let recorded: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(recorded, i64::try_from(MIGRATIONS.len()).unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upgrade_from_version_one_adds_audit_table() {
        let conn = memory_connection().await;
        apply(&conn, &MIGRATIONS[0]).await.unwrap();
        assert!(!has_table(&conn, "sync_audit").await);

        run(&conn).await.unwrap();
        assert!(has_table(&conn, "sync_audit").await);
        assert_eq!(schema_version(&conn).await.unwrap(), latest_version());

        let mut rows = conn
            .query("SELECT COUNT(*) FROM pragma_table_info('outbox') WHERE name = 'revision'", ())
            .await
            .unwrap();
        let revision_columns: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(revision_columns, 1);
    }
}
