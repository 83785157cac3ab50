//! File-based task store: one JSON document per finished task.
//!
//! Layout: `<dir>/task_<id>.json` with the id percent-encoded, pretty-printed
//! so records stay human-inspectable. Saving an existing id overwrites its file.

use async_trait::async_trait;
use siloed_core::error::StoreError;
use siloed_core::store::TaskStore;
use siloed_core::task::{TaskId, TaskRecord};
use std::path::PathBuf;
use tracing::{debug, warn};

const FILE_PREFIX: &str = "task_";
const FILE_SUFFIX: &str = ".json";

/// A directory of task records.
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Path of the record file for `id`.
    ///
    /// Bytes outside `[A-Za-z0-9-]` are percent-encoded, so distinct ids map to
    /// distinct files and a client-chosen id can never escape the directory.
    pub fn path_for(&self, id: &TaskId) -> PathBuf {
        let mut safe = String::with_capacity(id.as_str().len());
        for byte in id.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                safe.push(char::from(byte));
            } else {
                safe.push_str(&format!("%{byte:02X}"));
            }
        }
        self.dir.join(format!("{FILE_PREFIX}{safe}{FILE_SUFFIX}"))
    }

    async fn read_record(path: &PathBuf) -> Result<Option<TaskRecord>, StoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Io(format!("Failed to create task directory: {e}"))
        })?;

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Io(format!("Failed to serialize task record: {e}")))?;

        let path = self.path_for(&record.task_id);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to write {}: {e}", path.display())))?;

        debug!(task_id = %record.task_id, path = %path.display(), "Task record saved");
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let record = Self::read_record(&self.path_for(id)).await?;
        // A file written under another id is not this task's record
        Ok(record.filter(|r| r.task_id == *id))
    }

    async fn list(&self) -> Result<Vec<TaskId>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            // Nothing saved yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(format!("Failed to list tasks: {e}"))),
        };

        let mut ids = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(format!("Failed to list tasks: {e}")))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !name.starts_with(FILE_PREFIX) || !name.ends_with(FILE_SUFFIX) {
                continue;
            }

            let path = entry.path();
            match Self::read_record(&path).await {
                Ok(Some(record)) if self.path_for(&record.task_id) == path => {
                    ids.push(record.task_id)
                }
                Ok(Some(record)) => {
                    warn!(task_id = %record.task_id, file = %name, "Skipping record stored under another id");
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Skipping unreadable task record"),
            }
        }

        ids.sort();
        Ok(ids)
    }
}
