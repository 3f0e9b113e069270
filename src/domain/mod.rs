//! Domain layer types for the Outpost sync engine.
//!
//! This module contains the core types shared across the sync pipeline:
//! accounts, normalized and stored messages, inbox groupings, and the
//! identifier newtypes.

mod account;
mod inbox;
mod message;
mod types;

pub use account::{Account, AccountStatus, ProviderConfig, ProviderType};
pub use inbox::Inbox;
pub use message::{Address, AttachmentMeta, Note, NormalizedMessage, StoredMessage};
pub use types::{AccountId, InboxId, MessageId, ThreadId, UserId};
