pub mod agent;
pub mod config_cmd;
pub mod doctor;

use std::path::Path;

use clawshell_config::AppConfig;

/// Load the config at `path`, falling back to defaults when it is missing.
pub fn load(path: &Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_from(path).map_err(|e| format!("Failed to load config: {e}").into())
}
