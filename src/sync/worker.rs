//! Per-account sync worker.
//!
//! One run drives a single account through the pipeline: authenticate
//! (persisting any refreshed credentials immediately), list message
//! references in the checkpoint window, then fetch, thread, classify,
//! and store each new message through the dedup gate.
//!
//! # Checkpoint policy
//!
//! The window end is captured when the run starts. If no listing call
//! succeeds the checkpoint stays put and the account is marked errored,
//! so the same window is retried next run. Once any listing page has
//! succeeded the checkpoint advances to the window end even if later
//! pages failed or individual messages were malformed; the per-run
//! message cap plus listing overlap means stragglers are picked up by
//! later runs, and dedup absorbs the re-reads. Authentication and
//! connection failures during fetching are the exception: they mean the
//! rest of the batch is unreachable, so the run aborts and the
//! checkpoint holds.

use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;

use crate::config::SyncSettings;
use crate::crypto::{CredentialVault, CryptoError};
use crate::domain::{Account, AccountId, StoredMessage};
use crate::providers::email::{MailProvider, ProviderError};
use crate::storage::queries::{accounts, inboxes};
use crate::storage::{Database, DatabaseError};
use crate::sync::dedup::{DedupGate, InsertOutcome};
use crate::sync::{threading, warmup};

/// Errors that abort a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("credential error: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] DatabaseError),

    #[error("sync run exceeded its deadline")]
    Timeout,

    #[error("account not found: {0}")]
    UnknownAccount(AccountId),

    #[error("sync already in progress for account {0}")]
    InProgress(AccountId),
}

/// Result of one account's sync run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Account that was synced.
    pub account_id: AccountId,
    /// Messages newly stored this run.
    pub new_count: usize,
    /// References skipped by the dedup gate.
    pub skipped_count: usize,
    /// Messages whose fetch failed; the run continued past them.
    pub failed_fetches: usize,
    /// Why the run failed, if it did.
    pub error: Option<String>,
}

impl SyncOutcome {
    /// Whether the run completed and advanced the checkpoint.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

struct RunStats {
    checkpoint: DateTime<Utc>,
    new_count: usize,
    skipped_count: usize,
    failed_fetches: usize,
}

/// Computes the listing window lower bound for a run.
///
/// First-ever runs look back a bounded number of days; afterwards the
/// stored checkpoint bounds the window.
fn window_start(
    last_synced_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lookback_days: i64,
) -> DateTime<Utc> {
    last_synced_at.unwrap_or_else(|| now - Duration::days(lookback_days))
}

/// Syncs one account, applying the per-account deadline and recording the
/// result on the account row.
///
/// Never returns an error: failures are folded into the outcome so a
/// fan-out over many accounts can aggregate without short-circuiting.
pub async fn sync_account(
    db: &Database,
    vault: &CredentialVault,
    account: &Account,
    provider: &mut dyn MailProvider,
    settings: &SyncSettings,
) -> SyncOutcome {
    let deadline = StdDuration::from_secs(settings.account_deadline_secs);

    let result = match tokio::time::timeout(
        deadline,
        run_sync(db, vault, account, provider, settings),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout),
    };

    match result {
        Ok(stats) => {
            if let Err(e) = accounts::mark_synced(db, &account.id, stats.checkpoint).await {
                tracing::error!(account_id = %account.id, error = %e, "failed to record sync checkpoint");
            }

            tracing::info!(
                account_id = %account.id,
                new = stats.new_count,
                skipped = stats.skipped_count,
                failed_fetches = stats.failed_fetches,
                "account sync complete"
            );

            SyncOutcome {
                account_id: account.id.clone(),
                new_count: stats.new_count,
                skipped_count: stats.skipped_count,
                failed_fetches: stats.failed_fetches,
                error: None,
            }
        }
        Err(e) => {
            let message = e.to_string();
            if let Err(se) = accounts::mark_error(db, &account.id, &message).await {
                tracing::error!(account_id = %account.id, error = %se, "failed to record sync error");
            }

            tracing::warn!(account_id = %account.id, error = %message, "account sync failed");

            SyncOutcome {
                account_id: account.id.clone(),
                new_count: 0,
                skipped_count: 0,
                failed_fetches: 0,
                error: Some(message),
            }
        }
    }
}

async fn run_sync(
    db: &Database,
    vault: &CredentialVault,
    account: &Account,
    provider: &mut dyn MailProvider,
    settings: &SyncSettings,
) -> Result<RunStats, SyncError> {
    let window_end = Utc::now();
    let since = window_start(account.last_synced_at, window_end, settings.lookback_days);

    // A refreshed token pair must be persisted before anything can fail
    // later in the run; losing it strands the account.
    if let Some(new_credentials) = provider.ensure_authenticated().await? {
        let blob = vault.encrypt_json(&new_credentials)?;
        if let Err(e) = accounts::update_credentials(db, &account.id, blob.clone()).await {
            tracing::warn!(account_id = %account.id, error = %e, "credential persist failed, retrying once");
            accounts::update_credentials(db, &account.id, blob).await?;
        }
        tracing::debug!(account_id = %account.id, "persisted refreshed credentials");
    }

    let inbox = match &account.inbox_id {
        Some(inbox_id) => inboxes::get_by_id(db, inbox_id).await?,
        None => None,
    };
    let keywords = inbox
        .as_ref()
        .map(|i| i.warmup_keywords.clone())
        .unwrap_or_default();
    let default_stage = inbox.as_ref().and_then(|i| i.default_stage.clone());

    let gate = DedupGate::new(db);

    let mut stats = RunStats {
        checkpoint: window_end,
        new_count: 0,
        skipped_count: 0,
        failed_fetches: 0,
    };

    let mut page_token: Option<String> = None;
    let mut listed_once = false;
    let mut processed = 0usize;

    'pages: loop {
        let page = match provider.list_message_refs(since, page_token.as_deref()).await {
            Ok(page) => page,
            Err(e) if !listed_once => return Err(e.into()),
            Err(e) => {
                // Partial listing: keep what we have, the advanced
                // checkpoint window overlap covers the remainder.
                tracing::warn!(account_id = %account.id, error = %e, "listing failed mid-run");
                break;
            }
        };
        listed_once = true;

        for msg_ref in &page.refs {
            if gate.seen_provider_ref(&account.id, &msg_ref.provider_ref).await? {
                stats.skipped_count += 1;
                continue;
            }

            // The cap bounds fetch work, so already-synced references in
            // an overlapping window do not count against it.
            if processed >= settings.max_messages_per_run {
                tracing::debug!(
                    account_id = %account.id,
                    cap = settings.max_messages_per_run,
                    "per-run message cap reached"
                );
                break 'pages;
            }
            processed += 1;

            let message = match provider.fetch_message(msg_ref).await {
                Ok(message) => message,
                Err(e @ (ProviderError::Authentication(_) | ProviderError::Connection(_))) => {
                    // Revoked token or dropped session: every remaining
                    // fetch would fail too. Abort so the checkpoint holds
                    // and the window is re-listed next run.
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!(
                        account_id = %account.id,
                        provider_ref = %msg_ref.provider_ref,
                        error = %e,
                        "message fetch failed"
                    );
                    stats.failed_fetches += 1;
                    continue;
                }
            };

            let thread_id = threading::resolve(&message);

            if gate.seen_message_id(&message.message_id).await? {
                stats.skipped_count += 1;
                continue;
            }

            let is_filtered = warmup::is_warmup(&message, &keywords);

            let stored = StoredMessage::from_normalized(
                message,
                account.id.clone(),
                account.inbox_id.clone(),
                thread_id,
                is_filtered,
                default_stage.clone(),
            );

            match gate.store(&stored).await? {
                InsertOutcome::Inserted => stats.new_count += 1,
                InsertOutcome::Duplicate => stats.skipped_count += 1,
            }
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(stats)
}
