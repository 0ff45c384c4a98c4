use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Email error: {0}")]
    Email(#[from] crate::email::EmailError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid value '{value}' for environment variable {name}: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to resolve mailbox password: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

pub type Result<T> = std::result::Result<T, BeaconError>;
