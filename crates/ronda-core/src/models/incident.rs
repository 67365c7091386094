//! Incident record model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::IncidentCode;

/// A unique identifier for an incident, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentId(Uuid);

impl IncidentId {
    /// Create a new unique incident ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IncidentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// An incident ("R.A") record as seen by the sync engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Client-generated identifier, primary key in both stores
    pub id: IncidentId,
    /// Tentative or confirmed sequential code
    pub code: IncidentCode,
    /// Client timestamp of the first local save (Unix ms), used for outbox order
    pub created_at_local: i64,
    /// Business fields, passed through unchanged
    pub payload: serde_json::Value,
    /// Whether this save mutates a previously-synced record
    #[serde(default)]
    pub is_edit: bool,
}

impl IncidentRecord {
    /// Create a brand new record with a tentative code
    #[must_use]
    pub fn new(code: IncidentCode, payload: serde_json::Value) -> Self {
        Self {
            id: IncidentId::new(),
            code,
            created_at_local: chrono::Utc::now().timestamp_millis(),
            payload,
            is_edit: false,
        }
    }

    /// Year the record was stamped in
    pub const fn year(&self) -> i32 {
        self.code.year
    }
}

/// Derived synchronization state: presence in the outbox means `Unsynced`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Unsynced,
    Synced,
}
