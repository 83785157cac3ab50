//! Task record storage for Siloed.
//!
//! Provides:
//! - **File**: one pretty-printed JSON document per task under a directory
//! - **In-memory**: for tests and ephemeral servers

pub mod file;
pub mod in_memory;

pub use file::FileTaskStore;
pub use in_memory::InMemoryTaskStore;

use siloed_core::TaskStore;
use std::path::Path;
use std::sync::Arc;

/// Build the file store rooted at `dir`.
pub fn open(dir: &Path) -> Arc<dyn TaskStore> {
    Arc::new(FileTaskStore::new(dir.to_path_buf()))
}
