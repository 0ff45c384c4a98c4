//! IMAP client for the reply mailbox.

use std::fmt::Debug;

use async_imap::Session;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::io::{AsyncRead, AsyncWrite};
use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::ExposeSecret;

use crate::config::MailboxConfig;

use super::error::{EmailError, Result};
use super::transport::{imap_date, MailboxConnector, MailboxSession, RawMessage};

/// TCP stream with futures-io traits, as async-imap expects.
type AsyncTcpStream = async_io::Async<std::net::TcpStream>;

/// A byte stream IMAP can run over, with or without TLS.
trait ImapStream: AsyncRead + AsyncWrite + Unpin + Debug + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Debug + Send> ImapStream for T {}

type BoxedStream = Box<dyn ImapStream>;

/// Builds [`ImapClient`] sessions from a [`MailboxConfig`].
#[derive(Debug, Clone)]
pub struct ImapConnector {
    config: MailboxConfig,
}

impl ImapConnector {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(&self) -> Result<Box<dyn MailboxSession>> {
        let mut client = ImapClient::new();
        client.connect(&self.config).await?;
        Ok(Box::new(client))
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.config.user, self.config.address())
    }
}

/// One IMAP session.
pub struct ImapClient {
    session: Option<Session<BoxedStream>>,
}

impl ImapClient {
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Connects to the IMAP server and authenticates.
    pub async fn connect(&mut self, config: &MailboxConfig) -> Result<()> {
        if self.session.is_some() {
            debug!("Already connected to IMAP server");
            return Ok(());
        }

        let addr = config.address();
        info!("Connecting to IMAP server at {}", addr);

        let socket_addr = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| EmailError::MailboxConnection(format!("{}: {}", addr, e)))?
            .next()
            .ok_or_else(|| {
                EmailError::MailboxConnection(format!("{} did not resolve to an address", addr))
            })?;
        let tcp_stream = AsyncTcpStream::connect(socket_addr)
            .await
            .map_err(|e| EmailError::MailboxConnection(format!("{}: {}", addr, e)))?;

        let stream: BoxedStream = if config.use_tls {
            let tls = TlsConnector::new().danger_accept_invalid_certs(config.accept_invalid_certs);
            Box::new(tls.connect(&config.host, tcp_stream).await?)
        } else {
            warn!(
                "IMAP TLS disabled, credentials for {} travel in plain text",
                config.user
            );
            Box::new(tcp_stream)
        };

        let client = async_imap::Client::new(stream);
        let session = client
            .login(&config.user, config.password.expose_secret())
            .await
            .map_err(|(e, _)| EmailError::Authentication(e.to_string()))?;

        info!("Logged in to {} as {}", addr, config.user);
        self.session = Some(session);
        Ok(())
    }

    fn session(&mut self) -> Result<&mut Session<BoxedStream>> {
        self.session
            .as_mut()
            .ok_or_else(|| EmailError::MailboxConnection("Not connected".to_string()))
    }

    /// Opens a folder read-write with SELECT, so flags can be changed.
    pub async fn select_folder(&mut self, folder: &str) -> Result<u32> {
        info!("Selecting folder: {}", folder);

        let mailbox = self
            .session()?
            .select(folder)
            .await
            .map_err(|e| EmailError::MailboxProtocol(format!("SELECT {}: {}", folder, e)))?;

        debug!("Folder '{}' holds {} messages", folder, mailbox.exists);
        Ok(mailbox.exists)
    }

    /// Searches for unseen messages received since a date.
    pub async fn search_unseen(&mut self, since: NaiveDate) -> Result<Vec<u32>> {
        let query = format!("UNSEEN SINCE {}", imap_date(since));
        debug!("Searching with query: {}", query);

        let uids = self
            .session()?
            .uid_search(&query)
            .await
            .map_err(|e| EmailError::MailboxProtocol(e.to_string()))?;

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();
        debug!("Found {} unseen messages", uid_list.len());
        Ok(uid_list)
    }

    /// Fetches full messages by UID.
    ///
    /// `BODY[]` sets `\Seen` as a side effect; `BODY.PEEK[]` leaves flags alone.
    pub async fn fetch_emails(&mut self, uids: &[u32], mark_seen: bool) -> Result<Vec<RawMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let uid_set = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let query = if mark_seen {
            "(UID BODY[])"
        } else {
            "(UID BODY.PEEK[])"
        };

        debug!("Fetching {} emails with UIDs: {}", uids.len(), uid_set);

        let session = self.session()?;
        let mut messages = session
            .uid_fetch(&uid_set, query)
            .await
            .map_err(|e| EmailError::MailboxProtocol(e.to_string()))?;

        let mut results = Vec::new();
        let mut dropped = Vec::new();
        while let Some(message_result) = messages.next().await {
            match message_result {
                Ok(message) => {
                    if let (Some(uid), Some(body)) = (message.uid, message.body()) {
                        results.push(RawMessage {
                            uid,
                            body: body.to_vec(),
                        });
                    } else {
                        warn!("Message missing UID or body");
                        dropped.push("message missing UID or body".to_string());
                    }
                }
                Err(e) => {
                    warn!("Error fetching message: {}", e);
                    dropped.push(e.to_string());
                }
            }
        }
        drop(messages);

        ensure_nothing_lost(mark_seen, &dropped)?;
        debug!("Successfully fetched {} emails", results.len());
        Ok(results)
    }

    /// Adds the `\Seen` flag to one message.
    pub async fn add_seen_flag(&mut self, uid: u32) -> Result<()> {
        let session = self.session()?;
        let updates = session
            .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
            .await
            .map_err(|e| EmailError::MailboxProtocol(e.to_string()))?
            .collect::<Vec<_>>()
            .await;

        for update in updates {
            update.map_err(|e| EmailError::MailboxProtocol(format!("STORE {}: {}", uid, e)))?;
        }
        debug!("Marked UID {} as seen", uid);
        Ok(())
    }

    /// Disconnects from the IMAP server gracefully.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            info!("Disconnecting from IMAP server");
            session
                .logout()
                .await
                .map_err(|e| EmailError::MailboxProtocol(e.to_string()))?;
        }
        Ok(())
    }

    /// Checks if the client is currently connected.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

impl Default for ImapClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailboxSession for ImapClient {
    async fn open_inbox(&mut self, folder: &str) -> Result<u32> {
        self.select_folder(folder).await
    }

    async fn search_unseen_since(&mut self, since: NaiveDate) -> Result<Vec<u32>> {
        self.search_unseen(since).await
    }

    async fn fetch_messages(&mut self, uids: &[u32], mark_seen: bool) -> Result<Vec<RawMessage>> {
        self.fetch_emails(uids, mark_seen).await
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        self.add_seen_flag(uid).await
    }

    async fn close(&mut self) -> Result<()> {
        self.disconnect().await
    }
}

/// A `BODY[]` fetch has already flagged every requested message, so a message
/// that failed to come back would never be seen again. Under `BODY.PEEK[]` it
/// stays unseen and the next tick retries it.
fn ensure_nothing_lost(mark_seen: bool, dropped: &[String]) -> Result<()> {
    if mark_seen && !dropped.is_empty() {
        return Err(EmailError::MailboxProtocol(format!(
            "{} flagged message(s) could not be fetched: {}",
            dropped.len(),
            dropped.join("; ")
        )));
    }
    Ok(())
}

impl Drop for ImapClient {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("IMAP session dropped without LOGOUT");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn create_test_config(port: u16) -> MailboxConfig {
        MailboxConfig {
            host: "127.0.0.1".to_string(),
            port,
            user: "office@firma.ro".to_string(),
            password: SecretString::from("parola".to_string()),
            use_tls: true,
            accept_invalid_certs: true,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = ImapClient::new();
        assert!(!client.is_connected());
    }

    #[test]
    fn test_connector_describe_hides_password() {
        let connector = ImapConnector::new(create_test_config(993));
        assert_eq!(connector.describe(), "office@firma.ro@127.0.0.1:993");
        assert!(!format!("{:?}", connector).contains("parola"));
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let mut client = ImapClient::new();
        let result = client.select_folder("INBOX").await;
        assert!(matches!(result, Err(EmailError::MailboxConnection(_))));
    }

    #[test]
    fn test_lost_messages_fail_fetch_only_when_flagged() {
        let dropped = vec!["BAD parse".to_string()];
        assert!(matches!(
            ensure_nothing_lost(true, &dropped),
            Err(EmailError::MailboxProtocol(_))
        ));
        assert!(ensure_nothing_lost(false, &dropped).is_ok());
        assert!(ensure_nothing_lost(true, &[]).is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let connector = ImapConnector::new(create_test_config(port));
        let result = connector.connect().await;
        assert!(matches!(result, Err(EmailError::MailboxConnection(_))));
    }
}
