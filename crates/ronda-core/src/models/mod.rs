//! Data models for Ronda

mod audit;
mod code;
mod incident;
mod outbox;

pub use audit::{AuditEntry, AuditEvent};
pub use code::IncidentCode;
pub use incident::{IncidentId, IncidentRecord, SyncState};
pub use outbox::{OutboxEntry, Rejection};
