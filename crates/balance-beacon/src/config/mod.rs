pub mod loader;
pub mod mailbox;
pub mod schema;

use std::path::PathBuf;

pub use loader::{apply_env_overrides, load_settings, load_settings_from_str, validate_settings};
pub use mailbox::MailboxConfig;
pub use schema::{MonitorSettings, SeenPolicy};

use crate::error::ConfigError;

/// Database location: `BEACON_DB_PATH`, else `~/.balance-beacon/data/beacon.db`.
pub fn database_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = loader::env_value("BEACON_DB_PATH") {
        return Ok(PathBuf::from(path));
    }
    crate::db::default_database_path().ok_or_else(|| ConfigError::Validation {
        message: "cannot determine home directory; set BEACON_DB_PATH".to_string(),
    })
}

/// Monitor settings from `BEACON_SETTINGS` (a JSON file) when set, then
/// `BEACON_*` overrides.
pub fn settings_from_env() -> Result<MonitorSettings, ConfigError> {
    let base = match loader::env_value("BEACON_SETTINGS") {
        Some(path) => load_settings(path)?,
        None => MonitorSettings::default(),
    };
    apply_env_overrides(base)
}
