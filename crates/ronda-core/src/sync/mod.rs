//! Outbox-to-remote synchronization.

mod audit;
mod connectivity;
mod engine;
mod scheduler;

pub use audit::{AuditLog, LocalAuditLog};
pub use connectivity::{spawn_probe, AlwaysOnline, ConnectivityMonitor, ConnectivityStatus};
pub use engine::{StopReason, SyncEngine, SyncSummary, SyncTrigger};
pub use scheduler::{start_background, SyncHandle, SyncWorker};
