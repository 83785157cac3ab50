pub mod config_cmd;
pub mod history;
pub mod run;
pub mod serve;
pub mod status;

use siloed_config::AppConfig;
use std::path::Path;

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load_with(path).map_err(|e| format!("Failed to load config: {e}"))?)
}
