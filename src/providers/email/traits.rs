//! Mail provider trait definition.
//!
//! This module defines the [`MailProvider`] trait which abstracts over the
//! external mail backends (Gmail REST API, IMAP/SMTP). The sync worker is
//! written entirely against this trait, so the pipeline stays
//! provider-agnostic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{NormalizedMessage, ProviderType};

/// Result type alias for mail provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during mail provider operations.
///
/// A provider error aborts the current account's sync run only; the
/// orchestrator records it and moves on to the remaining accounts.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Authentication failed or credentials expired.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The provider returned a response we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request or parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Opaque reference to one message on the provider side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    /// Provider-local message reference (Gmail message id, IMAP folder:uid).
    pub provider_ref: String,
    /// Provider-native thread reference, when the provider has one.
    pub thread_ref: Option<String>,
}

/// One page of message references from a listing call.
#[derive(Debug, Clone, Default)]
pub struct MessageRefPage {
    /// References on this page.
    pub refs: Vec<MessageRef>,
    /// Continuation token; `None` when the provider has no more pages.
    pub next_page_token: Option<String>,
}

/// Credentials for either provider kind, stored vault-encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    /// Gmail OAuth credentials.
    Gmail(GmailCredentials),
    /// IMAP/SMTP username and password.
    Mailbox(MailboxCredentials),
}

/// OAuth credentials for the Gmail adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailCredentials {
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Long-lived refresh token from the consent flow.
    pub refresh_token: String,
    /// Current access token, if one has been issued.
    pub access_token: Option<String>,
    /// Expiry of the current access token.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Username/password credentials for the IMAP/SMTP adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxCredentials {
    /// Login username (usually the mailbox address).
    pub username: String,
    /// Password or app-specific password.
    pub password: String,
}

/// A message to be sent through a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Primary recipients.
    pub to: Vec<crate::domain::Address>,
    /// Carbon copy recipients.
    pub cc: Vec<crate::domain::Address>,
    /// Blind carbon copy recipients.
    pub bcc: Vec<crate::domain::Address>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body_text: String,
    /// HTML body (optional).
    pub body_html: Option<String>,
    /// Message-ID of the message being replied to.
    pub in_reply_to: Option<crate::domain::MessageId>,
}

/// Trait for mail provider implementations.
///
/// Implementations handle authentication, listing, fetching, and sending;
/// the sync worker drives them without knowing which backend is in play.
///
/// Methods take `&mut self` because the IMAP implementation keeps a
/// stateful mailbox session and the Gmail implementation caches the
/// current access token.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Returns the type of this provider.
    fn provider_type(&self) -> ProviderType;

    /// Establishes or refreshes authentication.
    ///
    /// For the Gmail adapter this performs a refresh-token exchange when
    /// the stored access token expires within the refresh horizon, and
    /// returns the replacement credential set so the caller can persist it
    /// before the run completes. For IMAP this opens and logs in the
    /// mailbox session and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Authentication`] if credentials are
    /// invalid or expired beyond recovery.
    async fn ensure_authenticated(&mut self) -> Result<Option<Credentials>>;

    /// Lists references to messages received since the given lower bound.
    ///
    /// The caller loops continuation tokens until the provider reports no
    /// more pages or the per-run message cap is reached.
    async fn list_message_refs(
        &mut self,
        since: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<MessageRefPage>;

    /// Fetches and normalizes one message.
    ///
    /// The returned message carries the provider-native thread reference
    /// when one exists; thread resolution happens downstream.
    async fn fetch_message(&mut self, msg_ref: &MessageRef) -> Result<NormalizedMessage>;

    /// Sends a message, returning the provider-assigned reference.
    async fn send_message(&mut self, draft: &OutgoingMessage) -> Result<String>;

    /// Verifies that the stored credentials can reach the mailbox.
    ///
    /// Used at account creation time and for manual health checks.
    async fn test_connection(&mut self) -> Result<bool>;
}
