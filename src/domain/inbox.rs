//! Destination inbox grouping.
//!
//! An inbox is the shared destination that one or more accounts feed into.
//! It owns the tenant's warmup keyword rules and the default stage applied
//! to newly synced messages.

use serde::{Deserialize, Serialize};

use super::InboxId;

/// A destination inbox grouping owned by a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inbox {
    /// Unique identifier for this inbox.
    pub id: InboxId,
    /// Display name.
    pub name: String,
    /// Warmup filter keywords, lower-cased at definition time.
    pub warmup_keywords: Vec<String>,
    /// Stage assigned to newly stored messages.
    pub default_stage: Option<String>,
}

impl Inbox {
    /// Creates a new inbox with no warmup rules.
    pub fn new(id: InboxId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            warmup_keywords: Vec::new(),
            default_stage: None,
        }
    }

    /// Replaces the warmup keyword list, lower-casing each entry and
    /// dropping blanks. Keywords are matched as substrings at sync time.
    pub fn set_warmup_keywords(&mut self, keywords: impl IntoIterator<Item = String>) {
        self.warmup_keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
    }
}
