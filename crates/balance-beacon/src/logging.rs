//! Process-wide logging setup for the monitor binary.
//!
//! Library code logs through both `log` and `tracing`. The subscriber
//! installed here receives `tracing` events directly and `log` records
//! through the `tracing-log` bridge.

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use crate::config::loader::env_flag;
use crate::error::ConfigError;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("A global subscriber is already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

/// Builds the level filter from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Output is JSON when `BEACON_LOG_JSON`
/// is truthy, human-readable otherwise.
pub fn init_logging() -> Result<(), LoggingError> {
    let json = env_flag("BEACON_LOG_JSON", false)?;
    let registry = Registry::default().with(env_filter());

    if json {
        let subscriber = registry.with(tracing_subscriber::fmt::layer().json());
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = registry.with(tracing_subscriber::fmt::layer().with_target(true));
        tracing::subscriber::set_global_default(subscriber)?;
    }

    tracing_log::LogTracer::init()?;
    tracing::debug!(json, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_filter() {
        std::env::remove_var("RUST_LOG");
        assert_eq!(env_filter().to_string(), DEFAULT_FILTER);
    }

    #[test]
    #[serial]
    fn test_filter_from_env() {
        std::env::set_var("RUST_LOG", "balance_beacon=debug");
        assert_eq!(env_filter().to_string(), "balance_beacon=debug");
        std::env::remove_var("RUST_LOG");
    }

    #[test]
    #[serial]
    fn test_rejects_invalid_json_flag() {
        std::env::set_var("BEACON_LOG_JSON", "sometimes");
        assert!(matches!(init_logging(), Err(LoggingError::Config(_))));
        std::env::remove_var("BEACON_LOG_JSON");
    }
}
