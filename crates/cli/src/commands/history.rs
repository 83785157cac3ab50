//! `siloed history`: List persisted tasks or print one record.

use siloed_core::task::TaskId;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let store = siloed_store::open(&config.storage.dir);

    match id {
        Some(id) => {
            let task_id = TaskId(id);
            let record = store
                .get(&task_id)
                .await?
                .ok_or_else(|| format!("No record for task {task_id}"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        None => {
            let ids = store.list().await?;
            if ids.is_empty() {
                println!("No tasks in {}", config.storage.dir.display());
            }
            for id in ids {
                println!("{id}");
            }
        }
    }

    Ok(())
}
