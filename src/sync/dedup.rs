//! Two-tier message deduplication.
//!
//! Tier 1 is per-account: a provider reference already synced for this
//! account is skipped before fetching, which keeps re-listed windows
//! cheap. Tier 2 is global: one Message-ID is stored at most once across
//! all accounts, so a conversation CC'd to several connected mailboxes
//! appears once.
//!
//! The pre-checks are advisory; the uniqueness constraints on the
//! messages table are the authority. A racing insert that loses reports
//! [`InsertOutcome::Duplicate`] and the worker counts it as skipped.

use crate::domain::{AccountId, MessageId, StoredMessage};
use crate::storage::queries::messages;
use crate::storage::{Database, Result};

pub use crate::storage::queries::messages::InsertOutcome;

/// Dedup gate over the message store.
pub struct DedupGate<'a> {
    db: &'a Database,
}

impl<'a> DedupGate<'a> {
    /// Creates a gate over the given database.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Tier 1: whether this provider reference was already synced for the
    /// account. Checked before fetching the message body.
    pub async fn seen_provider_ref(
        &self,
        account_id: &AccountId,
        provider_ref: &str,
    ) -> Result<bool> {
        messages::exists_provider_ref(self.db, account_id, provider_ref).await
    }

    /// Tier 2: whether any account already stored this Message-ID.
    /// Checked after fetching, before insertion.
    pub async fn seen_message_id(&self, message_id: &MessageId) -> Result<bool> {
        messages::exists_message_id(self.db, message_id).await
    }

    /// Stores the message unless a uniqueness constraint fires.
    pub async fn store(&self, message: &StoredMessage) -> Result<InsertOutcome> {
        messages::insert(self.db, message).await
    }
}
