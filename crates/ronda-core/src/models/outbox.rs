//! Outbox entry model

use serde::{Deserialize, Serialize};

use super::IncidentRecord;

/// Remote-side rejection bookkeeping for a queued record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Reason reported by the remote store
    pub reason: String,
    /// Last rejection time (unix ms)
    pub rejected_at: i64,
    /// How many times the remote has rejected this record
    pub count: u32,
}

/// A pending record together with its retry bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub record: IncidentRecord,
    pub rejection: Option<Rejection>,
    /// Bumped on every local rewrite of the record
    #[serde(default)]
    pub revision: i64,
}

impl OutboxEntry {
    /// Whether a rejected entry should sit out the current drain.
    ///
    /// Entries never rejected are always eligible.
    pub fn is_cooling_down(&self, now_ms: i64, cooldown_ms: i64) -> bool {
        self.rejection
            .as_ref()
            .is_some_and(|rejection| now_ms.saturating_sub(rejection.rejected_at) < cooldown_ms)
    }
}
