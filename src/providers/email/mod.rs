//! Mail provider implementations.
//!
//! This module contains the [`MailProvider`] trait and implementations for
//! the supported mail backends:
//!
//! - [`GmailProvider`] - Gmail REST API with OAuth 2.0
//! - [`ImapProvider`] - Standard IMAP/SMTP
//!
//! # Architecture
//!
//! The sync worker drives providers exclusively through [`MailProvider`]:
//! authenticate, list references in a time window, fetch one message at a
//! time, and send. Each adapter translates its backend's wire shapes into
//! the common [`NormalizedMessage`](crate::domain::NormalizedMessage) form
//! so everything downstream of the adapter is provider-agnostic.

mod gmail;
mod imap;
mod traits;

pub use gmail::GmailProvider;
pub use imap::{ImapConfig, ImapProvider};
pub use traits::{
    Credentials, GmailCredentials, MailProvider, MailboxCredentials, MessageRef, MessageRefPage,
    OutgoingMessage, ProviderError, Result,
};
