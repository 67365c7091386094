//! Local database layer for Ronda

mod audit_repository;
mod cache_repository;
mod connection;
mod migrations;
mod outbox_repository;

pub use audit_repository::{AuditRepository, LibSqlAuditRepository};
pub use cache_repository::{LibSqlSyncedCacheRepository, SyncedCacheRepository};
pub use connection::Database;
pub use outbox_repository::{LibSqlOutboxRepository, OutboxRepository};
