//! Mailbox connection settings read from the environment.

use std::fmt;

use secrecy::SecretString;

use super::loader::{env_flag, env_parsed, env_value};
use crate::error::ConfigError;
use crate::secrets::resolve_secret_optional;

pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Where and how to reach the reply mailbox.
#[derive(Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub use_tls: bool,
    pub accept_invalid_certs: bool,
}

impl fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("use_tls", &self.use_tls)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish_non_exhaustive()
    }
}

impl MailboxConfig {
    /// Reads `IMAP_*` variables.
    ///
    /// Returns `Ok(None)` when host, user or password is missing, so callers
    /// can run without a mailbox. Malformed values are errors.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let host = env_value("IMAP_HOST");
        let user = env_value("IMAP_USER");
        let password_file = env_value("IMAP_PASSWORD_FILE");
        let password = resolve_secret_optional(password_file.as_deref(), Some("IMAP_PASSWORD"))?;

        let (Some(host), Some(user), Some(password)) = (host, user, password) else {
            log::debug!("IMAP_HOST, IMAP_USER or IMAP_PASSWORD not set, mailbox disabled");
            return Ok(None);
        };

        Ok(Some(Self {
            host,
            port: env_parsed::<u16>("IMAP_PORT")?.unwrap_or(DEFAULT_IMAP_PORT),
            user,
            password,
            use_tls: env_flag("IMAP_TLS", true)?,
            accept_invalid_certs: env_flag("IMAP_ACCEPT_INVALID_CERTS", true)?,
        }))
    }

    /// `host:port`, for logs and socket resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
