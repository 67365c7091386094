//! Audit log collaborator.

use async_trait::async_trait;

use crate::models::{AuditEntry, AuditEvent};
use crate::services::LocalOutbox;

/// Receives conflict resolutions and batch summaries.
///
/// Recording must never fail a drain, so implementations swallow and log
/// their own errors.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Audit log persisted next to the outbox
#[derive(Clone)]
pub struct LocalAuditLog {
    outbox: LocalOutbox,
}

impl LocalAuditLog {
    pub const fn new(outbox: LocalOutbox) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl AuditLog for LocalAuditLog {
    async fn record(&self, event: AuditEvent) {
        let entry = AuditEntry::now(event);
        if let Err(error) = self.outbox.append_audit(&entry).await {
            tracing::error!(
                "Failed to persist {} audit entry: {}",
                entry.event.kind(),
                error
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IncidentCode, IncidentId};

    #[tokio::test(flavor = "multi_thread")]
    async fn local_audit_log_persists_entries() {
        let outbox = LocalOutbox::open_in_memory().await.unwrap();
        let audit = LocalAuditLog::new(outbox.clone());

        let event = AuditEvent::CodeReallocated {
            record_id: IncidentId::new(),
            old_code: IncidentCode::new(1, 2025),
            new_code: IncidentCode::new(2, 2025),
            cause: "test".to_string(),
        };
        audit.record(event.clone()).await;

        let entries = outbox.recent_audit(5).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, event);
    }
}
