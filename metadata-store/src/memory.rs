use crate::{AppMetadataRecord, MetadataStore, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

/// Process-local store, used for local runs and as a test double.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<BTreeMap<String, AppMetadataRecord>>,
    // Ids for which every request fails, to simulate store outages.
    failing_ids: RwLock<HashSet<String>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = AppMetadataRecord>) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.records.write() {
            guard.extend(records.into_iter().map(|r| (r.id.clone(), r)));
        }
        store
    }

    /// Makes every subsequent request touching `id` fail.
    pub fn fail_for(&self, id: &str) {
        if let Ok(mut guard) = self.failing_ids.write() {
            guard.insert(id.to_string());
        }
    }

    /// Copy of the current contents, ordered by id.
    pub fn snapshot(&self) -> BTreeMap<String, AppMetadataRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    fn check_available(&self, id: &str) -> Result<(), StoreError> {
        let failing = self
            .failing_ids
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if failing.contains(id) {
            return Err(StoreError::Unavailable(format!("request for {id} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<AppMetadataRecord>, StoreError> {
        self.check_available(id)?;
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(records.get(id).cloned())
    }

    async fn upsert(&self, record: &AppMetadataRecord) -> Result<(), StoreError> {
        self.check_available(&record.id)?;
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }
}
