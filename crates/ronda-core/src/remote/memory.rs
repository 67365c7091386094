//! In-process remote store, used by tests and the development API server.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RemoteError, RemoteIncidentStore, RemoteResult};
use crate::models::{IncidentCode, IncidentId, IncidentRecord};

/// Remote store kept in memory.
///
/// Enforces the same constraint as the central table: a code may be held by
/// one id per year.
#[derive(Clone, Default)]
pub struct MemoryIncidentStore {
    records: Arc<RwLock<HashMap<IncidentId, IncidentRecord>>>,
}

impl MemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, ordered by code
    pub async fn records(&self) -> Vec<IncidentRecord> {
        let records = self.records.read().await;
        let mut records: Vec<IncidentRecord> = records.values().cloned().collect();
        records.sort_by_key(|record| record.code);
        records
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, id: &IncidentId) -> Option<IncidentRecord> {
        self.records.read().await.get(id).cloned()
    }
}

/// Checks the central table applies before accepting a write
pub fn validate_record(record: &IncidentRecord) -> RemoteResult<()> {
    if record.code.number == 0 {
        return Err(RemoteError::Rejected(format!(
            "code {} must start at 1",
            record.code
        )));
    }
    if !record.payload.is_object() {
        return Err(RemoteError::Rejected(
            "payload must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl RemoteIncidentStore for MemoryIncidentStore {
    async fn find_by_code(&self, code: &IncidentCode) -> RemoteResult<Option<IncidentRecord>> {
        let records = self.records.read().await;
        Ok(records.values().find(|record| record.code == *code).cloned())
    }

    async fn list_codes_for_year(&self, year: i32) -> RemoteResult<BTreeSet<String>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| record.code.year == year)
            .map(|record| record.code.to_string())
            .collect())
    }

    async fn upsert(&self, record: &IncidentRecord) -> RemoteResult<()> {
        validate_record(record)?;

        let mut records = self.records.write().await;
        if let Some(holder) = records
            .values()
            .find(|existing| existing.code == record.code && existing.id != record.id)
        {
            return Err(RemoteError::Rejected(format!(
                "code {} is already held by incident {}",
                record.code, holder.id
            )));
        }

        records.insert(record.id, record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_twice_keeps_one_record() {
        let store = MemoryIncidentStore::new();
        let record = IncidentRecord::new(IncidentCode::new(1, 2025), json!({"a": 1}));

        store.upsert(&record).await.unwrap();
        store.upsert(&record).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&record.id).await, Some(record));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_rejects_code_held_by_other_id() {
        let store = MemoryIncidentStore::new();
        let first = IncidentRecord::new(IncidentCode::new(5, 2025), json!({}));
        let second = IncidentRecord::new(IncidentCode::new(5, 2025), json!({}));

        store.upsert(&first).await.unwrap();
        let error = store.upsert(&second).await.unwrap_err();

        assert!(!error.is_transient());
        assert!(error.to_string().contains("5/2025"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_rejects_non_object_payload() {
        let store = MemoryIncidentStore::new();
        let record = IncidentRecord::new(IncidentCode::new(1, 2025), json!("free text"));
        assert!(matches!(
            store.upsert(&record).await,
            Err(RemoteError::Rejected(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lookups_by_code_and_year() {
        let store = MemoryIncidentStore::new();
        let record = IncidentRecord::new(IncidentCode::new(2, 2025), json!({}));
        store.upsert(&record).await.unwrap();
        store
            .upsert(&IncidentRecord::new(IncidentCode::new(1, 2024), json!({})))
            .await
            .unwrap();

        let found = store.find_by_code(&IncidentCode::new(2, 2025)).await.unwrap();
        assert_eq!(found.map(|found| found.id), Some(record.id));
        assert!(store
            .find_by_code(&IncidentCode::new(3, 2025))
            .await
            .unwrap()
            .is_none());

        let codes = store.list_codes_for_year(2025).await.unwrap();
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec!["2/2025"]);
    }
}
