pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod serve;

use chatdesk_config::AppConfig;
use std::path::Path;

pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load_with(path).map_err(|e| format!("Failed to load config: {e}"))?)
}
