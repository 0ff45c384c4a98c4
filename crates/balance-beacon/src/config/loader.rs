use std::path::Path;
use std::str::FromStr;

use crate::config::schema::{MonitorSettings, SeenPolicy};
use crate::error::ConfigError;

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<MonitorSettings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<MonitorSettings, ConfigError> {
    let settings: MonitorSettings = serde_json::from_str(content)?;

    validate_settings(&settings)?;

    Ok(settings)
}

/// Applies `BEACON_*` environment overrides on top of `settings`.
pub fn apply_env_overrides(mut settings: MonitorSettings) -> Result<MonitorSettings, ConfigError> {
    if let Some(v) = env_parsed::<u32>("BEACON_INTERVAL_MINUTES")? {
        settings.interval_minutes = v;
    }
    if let Some(v) = env_parsed::<u32>("BEACON_WINDOW_DAYS")? {
        settings.window_days = v;
    }
    if let Some(v) = env_parsed::<u32>("BEACON_MATCH_WINDOW_DAYS")? {
        settings.match_window_days = v;
    }
    if let Some(v) = env_parsed::<u64>("BEACON_TICK_TIMEOUT_SECS")? {
        settings.tick_timeout_secs = v;
    }
    if let Some(v) = env_parsed::<SeenPolicy>("BEACON_SEEN_POLICY")? {
        settings.seen_policy = v;
    }
    if let Some(v) = env_value("BEACON_FOLDER") {
        settings.folder = v;
    }

    validate_settings(&settings)?;

    Ok(settings)
}

/// Upper bound for the search and match windows.
pub const MAX_WINDOW_DAYS: u32 = 3650;

pub fn validate_settings(settings: &MonitorSettings) -> Result<(), ConfigError> {
    let positive = [
        ("intervalMinutes", u64::from(settings.interval_minutes)),
        ("windowDays", u64::from(settings.window_days)),
        ("matchWindowDays", u64::from(settings.match_window_days)),
        ("tickTimeoutSecs", settings.tick_timeout_secs),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(ConfigError::Validation {
                message: format!("{} must be at least 1", name),
            });
        }
    }

    for (name, value) in [
        ("windowDays", settings.window_days),
        ("matchWindowDays", settings.match_window_days),
    ] {
        if value > MAX_WINDOW_DAYS {
            return Err(ConfigError::Validation {
                message: format!("{} must be at most {}", name, MAX_WINDOW_DAYS),
            });
        }
    }

    if settings.folder.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "folder must not be empty".to_string(),
        });
    }

    Ok(())
}

/// Reads an environment variable, treating blank values as unset.
pub(crate) fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_parsed<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_value(name)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError::InvalidEnv {
                name,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

pub(crate) fn env_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = env_value(name) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            name,
            value,
            reason: "expected true or false".to_string(),
        }),
    }
}
