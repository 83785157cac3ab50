//! TaskStore trait: persistence of finished task records.
//!
//! Implementations: JSON files on disk, in-memory (for testing).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::task::{TaskId, TaskRecord};

/// The core TaskStore trait.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Store (or overwrite) a record.
    async fn save(&self, record: &TaskRecord) -> std::result::Result<(), StoreError>;

    /// Get a record by task ID.
    async fn get(&self, id: &TaskId) -> std::result::Result<Option<TaskRecord>, StoreError>;

    /// List the IDs of all stored records, sorted.
    async fn list(&self) -> std::result::Result<Vec<TaskId>, StoreError>;
}
