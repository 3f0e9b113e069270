//! Account domain types.
//!
//! An account is one external mailbox credential under synchronization,
//! owned by a tenant user and optionally assigned to a destination inbox.
//! Its row carries the sync lifecycle state: health status, last error,
//! and the checkpoint timestamp bounding the next listing window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, InboxId, UserId};

/// An external mailbox account under synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for this account.
    pub id: AccountId,
    /// Mailbox address.
    pub email: String,
    /// Tenant user who connected this mailbox.
    pub owner_id: UserId,
    /// Type of mail provider backing the account.
    pub provider_type: ProviderType,
    /// Provider-specific connection configuration.
    pub provider_config: ProviderConfig,
    /// Vault-encrypted credential blob (see [`crate::crypto::CredentialVault`]).
    #[serde(skip_serializing)]
    pub credentials: Vec<u8>,
    /// Current health status.
    pub status: AccountStatus,
    /// Human-readable cause of the last failure, if any.
    pub last_error: Option<String>,
    /// Checkpoint: lower bound for the next sync's listing window.
    /// Absent before the first successful sync.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Destination inbox this account feeds into. Accounts without an
    /// assignment are skipped by scheduled sync.
    pub inbox_id: Option<InboxId>,
}

/// Type of mail provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Gmail REST API provider.
    Gmail,
    /// Standard IMAP/SMTP provider.
    Imap,
}

impl ProviderType {
    /// Storage representation of the provider type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Gmail => "gmail",
            ProviderType::Imap => "imap",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gmail" => Some(ProviderType::Gmail),
            "imap" => Some(ProviderType::Imap),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Credentials verified, account eligible for scheduled sync.
    Connected,
    /// Last sync attempt failed; retried on the next scheduled run.
    Error,
    /// Manually disconnected by the user; excluded from sync.
    Disconnected,
}

impl AccountStatus {
    /// Storage representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Connected => "connected",
            AccountStatus::Error => "error",
            AccountStatus::Disconnected => "disconnected",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connected" => Some(AccountStatus::Connected),
            "error" => Some(AccountStatus::Error),
            "disconnected" => Some(AccountStatus::Disconnected),
            _ => None,
        }
    }
}

/// Provider-specific connection configuration.
///
/// Credentials (token pairs, passwords) never live here; they are stored
/// encrypted in the account's credential blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Gmail API configuration. Everything needed beyond credentials is
    /// implied by the API surface.
    Gmail {},
    /// IMAP/SMTP configuration.
    Imap {
        /// IMAP server hostname.
        imap_host: String,
        /// IMAP server port.
        imap_port: u16,
        /// SMTP server hostname.
        smtp_host: String,
        /// SMTP server port.
        smtp_port: u16,
        /// Whether SMTP uses direct TLS (true) or STARTTLS (false).
        use_tls: bool,
    },
}
