//! IMAP/SMTP adapter.
//!
//! Implements [`MailProvider`] using IMAP4rev1 (RFC 3501) via `async-imap`
//! for listing and fetching, and SMTP via `lettre` for sending. This
//! covers every mailbox that is not Gmail (or Gmail over IMAP).
//!
//! # Protocol details
//!
//! - Listing uses `UID SEARCH SINCE dd-Mon-yyyy` against INBOX. IMAP
//!   SINCE has day granularity, so listing over-fetches slightly at the
//!   window edge; the dedup gate absorbs the overlap.
//! - Message references are `folder:uid`. IMAP has no server-side thread
//!   identifier, so fetched messages carry no native thread reference and
//!   thread resolution falls through to the header chain downstream.
//! - Sending uses SMTP with direct TLS or STARTTLS per the account
//!   configuration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use lettre::message::{Mailbox, MessageBuilder, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use super::{
    Credentials, MailProvider, MailboxCredentials, MessageRef, MessageRefPage, OutgoingMessage,
    ProviderError, Result,
};
use crate::domain::{AccountId, NormalizedMessage, ProviderConfig, ProviderType};
use crate::sync::normalize;

/// IMAP/SMTP server configuration.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    /// IMAP server hostname.
    pub imap_host: String,
    /// IMAP server port (typically 993 for TLS).
    pub imap_port: u16,
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (typically 465 for TLS, 587 for STARTTLS).
    pub smtp_port: u16,
    /// Whether SMTP uses direct TLS (true) or STARTTLS (false).
    pub use_tls: bool,
}

impl ImapConfig {
    /// Creates a configuration for a typical TLS setup.
    pub fn tls(imap_host: impl Into<String>, smtp_host: impl Into<String>) -> Self {
        Self {
            imap_host: imap_host.into(),
            imap_port: 993,
            smtp_host: smtp_host.into(),
            smtp_port: 465,
            use_tls: true,
        }
    }

    /// Creates a configuration for a STARTTLS setup.
    pub fn starttls(imap_host: impl Into<String>, smtp_host: impl Into<String>) -> Self {
        Self {
            imap_host: imap_host.into(),
            imap_port: 143,
            smtp_host: smtp_host.into(),
            smtp_port: 587,
            use_tls: false,
        }
    }

    /// Extracts the IMAP configuration from an account's provider config.
    pub fn from_provider_config(config: &ProviderConfig) -> Option<Self> {
        match config {
            ProviderConfig::Imap {
                imap_host,
                imap_port,
                smtp_host,
                smtp_port,
                use_tls,
            } => Some(Self {
                imap_host: imap_host.clone(),
                imap_port: *imap_port,
                smtp_host: smtp_host.clone(),
                smtp_port: *smtp_port,
                use_tls: *use_tls,
            }),
            ProviderConfig::Gmail {} => None,
        }
    }
}

/// Type alias for the IMAP session with TLS (using tokio-util compat layer).
type ImapSession = async_imap::Session<Compat<TlsStream<TcpStream>>>;

/// Formats a listing lower bound as an IMAP SEARCH SINCE date.
fn since_search_query(since: DateTime<Utc>) -> String {
    format!("SINCE {}", since.format("%d-%b-%Y"))
}

/// Splits a `folder:uid` provider reference.
fn parse_provider_ref(provider_ref: &str) -> Result<(&str, u32)> {
    let (folder, uid) = provider_ref.split_once(':').ok_or_else(|| {
        ProviderError::InvalidRequest(format!("invalid message reference: {}", provider_ref))
    })?;
    let uid = uid.parse().map_err(|_| {
        ProviderError::InvalidRequest(format!("invalid UID in reference: {}", provider_ref))
    })?;
    Ok((folder, uid))
}

/// IMAP/SMTP mail provider.
///
/// Keeps one logged-in IMAP session per sync run; the session is opened by
/// [`ensure_authenticated`](MailProvider::ensure_authenticated) and reused
/// for all listing and fetching in the run.
pub struct ImapProvider {
    /// Account this provider syncs.
    account_id: AccountId,
    /// Mailbox address, used as the From address and sent-copy detection.
    account_email: String,
    /// Server configuration.
    config: ImapConfig,
    /// Vault-decrypted login credentials.
    credentials: MailboxCredentials,
    /// IMAP session, present once authenticated.
    session: Option<ImapSession>,
}

impl ImapProvider {
    /// Creates a new IMAP provider for the specified account.
    pub fn new(
        account_id: AccountId,
        account_email: impl Into<String>,
        config: ImapConfig,
        credentials: MailboxCredentials,
    ) -> Self {
        Self {
            account_id,
            account_email: account_email.into(),
            config,
            credentials,
            session: None,
        }
    }

    /// Returns the account ID for this provider.
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ImapConfig {
        &self.config
    }

    /// Establishes a TLS connection to the IMAP server with the futures
    /// compat wrapper `async-imap` expects.
    async fn connect_tls(&self) -> Result<Compat<TlsStream<TcpStream>>> {
        let tcp_stream = TcpStream::connect(format!(
            "{}:{}",
            self.config.imap_host, self.config.imap_port
        ))
        .await
        .map_err(|e| ProviderError::Connection(format!("TCP connect failed: {}", e)))?;

        let config = ClientConfig::builder()
            .with_root_certificates(tokio_rustls::rustls::RootCertStore::from_iter(
                webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
            ))
            .with_no_client_auth();

        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(self.config.imap_host.clone())
            .map_err(|e| ProviderError::Connection(format!("invalid server name: {}", e)))?;

        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| ProviderError::Connection(format!("TLS handshake failed: {}", e)))?;

        Ok(tls_stream.compat())
    }

    /// Opens and logs in a fresh IMAP session.
    async fn login(&self) -> Result<ImapSession> {
        let tls_stream = self.connect_tls().await?;
        let client = async_imap::Client::new(tls_stream);

        client
            .login(&self.credentials.username, &self.credentials.password)
            .await
            .map_err(|e| ProviderError::Authentication(format!("IMAP login failed: {:?}", e.0)))
    }

    /// Returns the open session, or an error if not authenticated.
    fn session_mut(&mut self) -> Result<&mut ImapSession> {
        self.session
            .as_mut()
            .ok_or_else(|| ProviderError::Authentication("not authenticated".to_string()))
    }

    /// Builds an RFC 5322 message from the outgoing draft.
    fn build_message(&self, draft: &OutgoingMessage) -> Result<Message> {
        let from_mailbox: Mailbox = self
            .account_email
            .parse()
            .map_err(|e| ProviderError::InvalidRequest(format!("invalid from address: {}", e)))?;

        let mut builder = MessageBuilder::new().from(from_mailbox);

        for addr in &draft.to {
            let mailbox: Mailbox = addr.display().parse().map_err(|e| {
                ProviderError::InvalidRequest(format!("invalid to address: {}", e))
            })?;
            builder = builder.to(mailbox);
        }

        for addr in &draft.cc {
            let mailbox: Mailbox = addr.display().parse().map_err(|e| {
                ProviderError::InvalidRequest(format!("invalid cc address: {}", e))
            })?;
            builder = builder.cc(mailbox);
        }

        for addr in &draft.bcc {
            let mailbox: Mailbox = addr.display().parse().map_err(|e| {
                ProviderError::InvalidRequest(format!("invalid bcc address: {}", e))
            })?;
            builder = builder.bcc(mailbox);
        }

        builder = builder.subject(&draft.subject);

        if let Some(ref reply_to) = draft.in_reply_to {
            builder = builder.in_reply_to(reply_to.0.clone());
        }

        let body = if let Some(ref html) = draft.body_html {
            MultiPart::alternative()
                .singlepart(SinglePart::plain(draft.body_text.clone()))
                .singlepart(SinglePart::html(html.clone()))
        } else {
            MultiPart::mixed().singlepart(SinglePart::plain(draft.body_text.clone()))
        };

        builder
            .multipart(body)
            .map_err(|e| ProviderError::InvalidRequest(format!("failed to build message: {}", e)))
    }
}

#[async_trait]
impl MailProvider for ImapProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Imap
    }

    async fn ensure_authenticated(&mut self) -> Result<Option<Credentials>> {
        if self.session.is_none() {
            let session = self.login().await?;
            self.session = Some(session);
            tracing::info!(account_id = %self.account_id, "IMAP session authenticated");
        }
        // Password logins never rotate mid-run; nothing to persist.
        Ok(None)
    }

    async fn list_message_refs(
        &mut self,
        since: DateTime<Utc>,
        _page_token: Option<&str>,
    ) -> Result<MessageRefPage> {
        let query = since_search_query(since);
        let session = self.session_mut()?;

        session
            .select("INBOX")
            .await
            .map_err(|e| ProviderError::Connection(format!("SELECT failed: {}", e)))?;

        let uids = session
            .uid_search(&query)
            .await
            .map_err(|e| ProviderError::Connection(format!("SEARCH failed: {}", e)))?;

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();

        let refs = uid_list
            .into_iter()
            .map(|uid| MessageRef {
                provider_ref: format!("INBOX:{}", uid),
                thread_ref: None,
            })
            .collect();

        // UID SEARCH returns the whole window at once.
        Ok(MessageRefPage {
            refs,
            next_page_token: None,
        })
    }

    async fn fetch_message(&mut self, msg_ref: &MessageRef) -> Result<NormalizedMessage> {
        let (folder, uid) = parse_provider_ref(&msg_ref.provider_ref)?;
        let folder = folder.to_string();
        let account_email = self.account_email.clone();
        let session = self.session_mut()?;

        session
            .select(&folder)
            .await
            .map_err(|e| ProviderError::Connection(format!("SELECT failed: {}", e)))?;

        let mut fetches = session
            .uid_fetch(uid.to_string(), "(UID BODY[])")
            .await
            .map_err(|e| ProviderError::Connection(format!("FETCH failed: {}", e)))?;

        while let Some(fetch_result) = fetches.next().await {
            let fetch = fetch_result
                .map_err(|e| ProviderError::Connection(format!("FETCH stream: {}", e)))?;

            let Some(body) = fetch.body() else {
                continue;
            };

            let mut message = normalize::from_rfc822(body, &msg_ref.provider_ref)
                .map_err(|e| ProviderError::Protocol(format!("parse message: {}", e)))?;

            // IMAP has no sent label; outbound copies are recognized by the
            // sender matching the account's own address.
            message.is_sent = message.from.email.eq_ignore_ascii_case(&account_email);
            return Ok(message);
        }

        Err(ProviderError::NotFound(format!(
            "message not found: {}",
            msg_ref.provider_ref
        )))
    }

    async fn send_message(&mut self, draft: &OutgoingMessage) -> Result<String> {
        let message = self.build_message(draft)?;

        let smtp_credentials = SmtpCredentials::new(
            self.credentials.username.clone(),
            self.credentials.password.clone(),
        );

        let mailer: AsyncSmtpTransport<Tokio1Executor> = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
                .map_err(|e| ProviderError::Connection(format!("SMTP relay error: {}", e)))?
                .credentials(smtp_credentials)
                .port(self.config.smtp_port)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| ProviderError::Connection(format!("SMTP relay error: {}", e)))?
                .credentials(smtp_credentials)
                .port(self.config.smtp_port)
                .build()
        };

        let response = mailer
            .send(message)
            .await
            .map_err(|e| ProviderError::Connection(format!("SMTP send failed: {}", e)))?;

        let message_id = response
            .message()
            .next()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("<sent-{}>", Utc::now().timestamp()));

        tracing::info!(account_id = %self.account_id, message_id = %message_id, "message sent via SMTP");
        Ok(message_id)
    }

    async fn test_connection(&mut self) -> Result<bool> {
        match self.login().await {
            Ok(mut session) => {
                let _ = session.logout().await;
                Ok(true)
            }
            Err(ProviderError::Authentication(e)) => {
                tracing::debug!(account_id = %self.account_id, error = %e, "IMAP connection test failed");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
