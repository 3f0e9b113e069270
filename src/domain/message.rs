//! Message domain types.
//!
//! [`NormalizedMessage`] is the provider-agnostic in-flight shape produced
//! by the adapters and normalizer; [`StoredMessage`] is what the dedup gate
//! persists, extended with inbox assignment and CRM workflow fields that
//! downstream collaborators mutate after storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, InboxId, MessageId, ThreadId, UserId};

/// An email address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Email address, always lower-cased by the normalizer.
    pub email: String,
    /// Display name (e.g., "John Doe"). None for bare addresses.
    pub name: Option<String>,
}

impl Address {
    /// Creates a new address with just an email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    /// Creates a new address with email and display name.
    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }

    /// Returns the display representation of this address.
    ///
    /// If a name is present, returns "Name <email>", otherwise just the email.
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// Metadata describing a message attachment.
///
/// Attachment bytes are never transferred during sync; they are fetched on
/// demand using the provider reference recorded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// Original filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Size in bytes, when the provider reports it.
    pub size_bytes: Option<u64>,
    /// Provider-side handle for fetching the attachment body later.
    pub provider_attachment_id: Option<String>,
}

/// A provider-agnostic message, normalized but not yet persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Global message identifier (Message-ID header, or synthetic).
    pub message_id: MessageId,
    /// Provider-local reference (Gmail message id, IMAP folder:uid).
    pub provider_ref: String,
    /// Provider-native thread identifier; only REST providers supply one.
    pub provider_thread_id: Option<String>,
    /// Message-ID this message replies to.
    pub in_reply_to: Option<MessageId>,
    /// Ordered References header chain.
    pub references: Vec<MessageId>,
    /// Sender address.
    pub from: Address,
    /// Primary recipients.
    pub to: Vec<Address>,
    /// Carbon copy recipients.
    pub cc: Vec<Address>,
    /// Blind carbon copy recipients.
    pub bcc: Vec<Address>,
    /// Subject line.
    pub subject: Option<String>,
    /// Plain text body.
    pub body_text: Option<String>,
    /// HTML body.
    pub body_html: Option<String>,
    /// When the message was received (or sent, for outbound copies).
    pub received_at: DateTime<Utc>,
    /// Attachment metadata; bytes are fetched on demand.
    pub attachments: Vec<AttachmentMeta>,
    /// Whether this is an outbound copy rather than a received message.
    pub is_sent: bool,
}

/// A note attached to a stored message by a team member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Author of the note.
    pub author_id: UserId,
    /// Note content.
    pub body: String,
    /// When the note was written.
    pub created_at: DateTime<Utc>,
}

/// A message as persisted by the sync engine.
///
/// The sync engine writes each unique message exactly once; the flags,
/// stage, tags, assignee, and notes are owned by the CRUD layer afterwards
/// and never touched on a re-sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Row identifier (UUID).
    pub id: String,
    /// Account the message was synced from.
    pub account_id: AccountId,
    /// Destination inbox the owning account feeds into.
    pub inbox_id: Option<InboxId>,
    /// Resolved conversation thread.
    pub thread_id: ThreadId,
    /// Normalized message content.
    pub message: NormalizedMessage,
    /// Whether the message has been read.
    pub is_read: bool,
    /// Whether the message has been archived.
    pub is_archived: bool,
    /// Whether the warmup classifier flagged this message.
    pub is_filtered: bool,
    /// Pipeline stage, seeded from the inbox default.
    pub stage: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Team member the conversation is assigned to.
    pub assignee: Option<UserId>,
    /// Embedded team notes.
    pub notes: Vec<Note>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Builds a fresh stored message for a newly synced normalized message.
    ///
    /// Sent copies start read; received messages start unread.
    pub fn from_normalized(
        message: NormalizedMessage,
        account_id: AccountId,
        inbox_id: Option<InboxId>,
        thread_id: ThreadId,
        is_filtered: bool,
        stage: Option<String>,
    ) -> Self {
        let is_read = message.is_sent;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            inbox_id,
            thread_id,
            message,
            is_read,
            is_archived: false,
            is_filtered,
            stage,
            tags: Vec::new(),
            assignee: None,
            notes: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
