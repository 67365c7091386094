//! Sync audit model

use serde::{Deserialize, Serialize};

use super::{IncidentCode, IncidentId};

/// What happened during synchronization that an operator may need to see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A tentative code collided with a remote record and was renumbered
    CodeReallocated {
        record_id: IncidentId,
        old_code: IncidentCode,
        new_code: IncidentCode,
        cause: String,
    },
    /// A drain pass finished (fully or early)
    BatchCompleted {
        trigger: String,
        synced: usize,
        rejected: usize,
        reallocated: usize,
        pending: usize,
        stopped: Option<String>,
    },
}

impl AuditEvent {
    /// Short label stored alongside the entry
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CodeReallocated { .. } => "code_reallocated",
            Self::BatchCompleted { .. } => "batch_completed",
        }
    }
}

/// Recorded audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Audit row identifier (0 until persisted)
    pub id: i64,
    /// When the event was recorded (unix ms)
    pub recorded_at: i64,
    /// Event details
    pub event: AuditEvent,
}

impl AuditEntry {
    #[must_use]
    pub fn now(event: AuditEvent) -> Self {
        Self {
            id: 0,
            recorded_at: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}
