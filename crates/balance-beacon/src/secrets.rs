//! Secret resolution for mailbox credentials.
//!
//! A secret comes from one of two places, checked in order:
//!
//! 1. **File reference** - Docker secrets pattern (e.g. `IMAP_PASSWORD_FILE=/run/secrets/imap`)
//! 2. **Env var** - the value itself (e.g. `IMAP_PASSWORD`)

use secrecy::SecretString;
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need a file path or an env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Secret from {origin} is empty")]
    Empty { origin: String },
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from a file or an environment variable.
///
/// The file wins when both are given. Surrounding whitespace is trimmed, and
/// a secret that is empty after trimming is rejected.
pub fn resolve_secret(file_path: Option<&str>, env_var: Option<&str>) -> Result<SecretString> {
    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        return non_empty(content.trim(), &expanded);
    }

    if let Some(var_name) = env_var.filter(|v| !v.is_empty()) {
        return match std::env::var(var_name) {
            // Env vars may carry trailing newlines.
            Ok(value) => non_empty(value.trim(), var_name),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: var_name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: var_name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but an unset env var or a missing source is
/// `Ok(None)` rather than an error.
pub fn resolve_secret_optional(
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided | SecretError::EnvVarNotSet { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn non_empty(value: &str, origin: &str) -> Result<SecretString> {
    if value.is_empty() {
        return Err(SecretError::Empty {
            origin: origin.to_string(),
        });
    }
    Ok(SecretString::from(value.to_string()))
}

/// Expands `~` to the user's home directory.
///
/// Only `~` and `~/path` are supported, not `~user/path`.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            if path == "~" {
                return home.into_owned();
            }
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
