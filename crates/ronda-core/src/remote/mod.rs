//! Adapters over the central incident table.
//!
//! The remote store is the only place records become authoritative. Failures
//! are split into transient ones (keep the record, retry on the next trigger)
//! and rejections (keep the record, flag it, move on).

mod http;
mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{IncidentCode, IncidentRecord};

pub use http::HttpIncidentStore;
pub use memory::{validate_record, MemoryIncidentStore};

/// Why a remote call did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// No connectivity, timeout, or a server-side failure worth retrying
    #[error("Remote store unavailable: {0}")]
    Transient(String),
    /// The remote store refused the request as invalid
    #[error("Remote store rejected the request: {0}")]
    Rejected(String),
}

impl RemoteError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Central incident store
#[async_trait]
pub trait RemoteIncidentStore: Send + Sync {
    /// Record currently holding `code`, if any
    async fn find_by_code(&self, code: &IncidentCode) -> RemoteResult<Option<IncidentRecord>>;

    /// Every code the remote holds for `year`
    async fn list_codes_for_year(&self, year: i32) -> RemoteResult<BTreeSet<String>>;

    /// Insert or replace by id; repeating an identical upsert is harmless
    async fn upsert(&self, record: &IncidentRecord) -> RemoteResult<()>;

    /// Cheap reachability check used by connectivity probes
    async fn ping(&self) -> RemoteResult<()> {
        Ok(())
    }
}
