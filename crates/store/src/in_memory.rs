//! In-memory task store: useful for testing and ephemeral servers.

use async_trait::async_trait;
use siloed_core::error::StoreError;
use siloed_core::store::TaskStore;
use siloed_core::task::{TaskId, TaskRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Records keyed by task id; iteration order is the sorted id order.
pub struct InMemoryTaskStore {
    records: Arc<RwLock<BTreeMap<TaskId, TaskRecord>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.task_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<TaskId>, StoreError> {
        Ok(self.records.read().await.keys().cloned().collect())
    }
}
