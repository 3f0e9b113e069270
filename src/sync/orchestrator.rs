//! Sync fan-out across accounts.
//!
//! The orchestrator owns the scheduled loop: it loads the eligible
//! accounts, decrypts each one's credentials, builds the right provider
//! adapter, and fans the per-account workers out with bounded
//! concurrency. One account failing never stops the others; the summary
//! carries every outcome.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::config::SyncSettings;
use crate::crypto::CredentialVault;
use crate::domain::{Account, AccountId, AccountStatus, ProviderType, UserId};
use crate::providers::email::{
    Credentials, GmailProvider, ImapConfig, ImapProvider, MailProvider, ProviderError,
};
use crate::storage::queries::accounts;
use crate::storage::Database;
use crate::sync::worker::{self, SyncError, SyncOutcome};

/// Builds provider adapters for accounts.
///
/// Injected so tests can drive the orchestrator with scripted providers
/// instead of live backends.
pub trait ProviderFactory: Send + Sync {
    /// Creates the adapter for an account with its decrypted credentials.
    fn create(
        &self,
        account: &Account,
        credentials: Credentials,
    ) -> Result<Box<dyn MailProvider>, ProviderError>;
}

/// Factory producing the real Gmail and IMAP adapters.
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    fn create(
        &self,
        account: &Account,
        credentials: Credentials,
    ) -> Result<Box<dyn MailProvider>, ProviderError> {
        match (account.provider_type, credentials) {
            (ProviderType::Gmail, Credentials::Gmail(creds)) => Ok(Box::new(GmailProvider::new(
                account.id.clone(),
                &account.email,
                creds,
            ))),
            (ProviderType::Imap, Credentials::Mailbox(creds)) => {
                let config = ImapConfig::from_provider_config(&account.provider_config)
                    .ok_or_else(|| {
                        ProviderError::InvalidRequest(
                            "IMAP account is missing server configuration".to_string(),
                        )
                    })?;
                Ok(Box::new(ImapProvider::new(
                    account.id.clone(),
                    &account.email,
                    config,
                    creds,
                )))
            }
            (provider_type, _) => Err(ProviderError::InvalidRequest(format!(
                "credential kind does not match {} provider",
                provider_type
            ))),
        }
    }
}

/// Aggregate result of one fan-out pass.
#[derive(Debug, Default)]
pub struct SyncSummary {
    /// Outcome of every account that ran.
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncSummary {
    /// Number of accounts that completed successfully.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of accounts that failed.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Total messages newly stored across accounts.
    pub fn new_messages(&self) -> usize {
        self.outcomes.iter().map(|o| o.new_count).sum()
    }
}

/// Fans per-account sync workers out over the connected accounts.
pub struct SyncOrchestrator {
    db: Database,
    vault: Arc<CredentialVault>,
    settings: SyncSettings,
    factory: Arc<dyn ProviderFactory>,
    in_flight: Arc<Mutex<HashSet<AccountId>>>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator with the real provider adapters.
    pub fn new(db: Database, vault: Arc<CredentialVault>, settings: SyncSettings) -> Self {
        Self::with_factory(db, vault, settings, Arc::new(DefaultProviderFactory))
    }

    /// Creates an orchestrator with a custom provider factory.
    pub fn with_factory(
        db: Database,
        vault: Arc<CredentialVault>,
        settings: SyncSettings,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            db,
            vault,
            settings,
            factory,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Runs the scheduled sync loop forever.
    pub async fn run_scheduled(&self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.settings.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.sync_all_eligible().await {
                Ok(summary) => {
                    tracing::info!(
                        accounts = summary.outcomes.len(),
                        succeeded = summary.succeeded(),
                        failed = summary.failed(),
                        new_messages = summary.new_messages(),
                        "scheduled sync pass complete"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "scheduled sync pass failed to start");
                }
            }
        }
    }

    /// Syncs every eligible account (connected or retrying, with a
    /// destination inbox), bounded by the configured concurrency.
    pub async fn sync_all_eligible(&self) -> Result<SyncSummary, SyncError> {
        let eligible = accounts::get_eligible(&self.db).await?;
        Ok(self.fan_out(eligible).await)
    }

    /// Syncs all of one user's accounts that are not disconnected.
    pub async fn sync_for_user(&self, user_id: &UserId) -> Result<SyncSummary, SyncError> {
        let owned = accounts::get_by_owner(&self.db, user_id)
            .await?
            .into_iter()
            .filter(|a| a.status != AccountStatus::Disconnected)
            .collect();
        Ok(self.fan_out(owned).await)
    }

    /// Syncs one account on demand.
    pub async fn sync_one(&self, account_id: &AccountId) -> Result<SyncOutcome, SyncError> {
        let account = accounts::get_by_id(&self.db, account_id)
            .await?
            .ok_or_else(|| SyncError::UnknownAccount(account_id.clone()))?;

        if !self.claim(&account.id).await {
            return Err(SyncError::InProgress(account.id));
        }

        let outcome = self.run_account(&account).await;
        self.release(&account.id).await;
        Ok(outcome)
    }

    async fn fan_out(&self, accounts: Vec<Account>) -> SyncSummary {
        let outcomes: Vec<SyncOutcome> = stream::iter(
            accounts
                .into_iter()
                .map(|account| self.sync_claimed(account)),
        )
        .buffer_unordered(self.settings.max_concurrent_accounts)
        .filter_map(|outcome| async move { outcome })
        .collect()
        .await;

        SyncSummary { outcomes }
    }

    /// Claims the account against concurrent runs, syncs it, releases.
    /// Returns `None` when the account is already being synced.
    async fn sync_claimed(&self, account: Account) -> Option<SyncOutcome> {
        if !self.claim(&account.id).await {
            tracing::debug!(account_id = %account.id, "sync already in flight, skipping");
            return None;
        }

        let outcome = self.run_account(&account).await;
        self.release(&account.id).await;
        Some(outcome)
    }

    async fn run_account(&self, account: &Account) -> SyncOutcome {
        let credentials: Credentials = match self.vault.decrypt_json(&account.credentials) {
            Ok(credentials) => credentials,
            Err(e) => return self.fail_account(&account.id, SyncError::Crypto(e)).await,
        };

        let mut provider = match self.factory.create(account, credentials) {
            Ok(provider) => provider,
            Err(e) => return self.fail_account(&account.id, e.into()).await,
        };

        worker::sync_account(
            &self.db,
            &self.vault,
            account,
            provider.as_mut(),
            &self.settings,
        )
        .await
    }

    /// Records an account-level failure that happened before the worker
    /// could run (undecryptable credentials, misconfigured provider).
    async fn fail_account(&self, account_id: &AccountId, error: SyncError) -> SyncOutcome {
        let message = error.to_string();
        if let Err(e) = accounts::mark_error(&self.db, account_id, &message).await {
            tracing::error!(account_id = %account_id, error = %e, "failed to record sync error");
        }

        tracing::warn!(account_id = %account_id, error = %message, "account sync failed before provider run");

        SyncOutcome {
            account_id: account_id.clone(),
            new_count: 0,
            skipped_count: 0,
            failed_fetches: 0,
            error: Some(message),
        }
    }

    async fn claim(&self, account_id: &AccountId) -> bool {
        self.in_flight.lock().await.insert(account_id.clone())
    }

    async fn release(&self, account_id: &AccountId) {
        self.in_flight.lock().await.remove(account_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, new_count: usize, error: Option<&str>) -> SyncOutcome {
        SyncOutcome {
            account_id: AccountId::from(id),
            new_count,
            skipped_count: 0,
            failed_fetches: 0,
            error: error.map(|s| s.to_string()),
        }
    }

    #[test]
    fn summary_accounting() {
        let summary = SyncSummary {
            outcomes: vec![
                outcome("a", 3, None),
                outcome("b", 0, Some("authentication failed")),
                outcome("c", 2, None),
            ],
        };

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.new_messages(), 5);
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        let db = Database::open_in_memory().await.unwrap();
        let vault = Arc::new(crate::crypto::CredentialVault::new(&[7u8; 32]).unwrap());
        let orchestrator = SyncOrchestrator::new(db, vault, SyncSettings::default());

        let id = AccountId::from("acct-1");
        assert!(orchestrator.claim(&id).await);
        assert!(!orchestrator.claim(&id).await);

        orchestrator.release(&id).await;
        assert!(orchestrator.claim(&id).await);
    }

    #[test]
    fn factory_rejects_mismatched_credentials() {
        use crate::domain::{AccountStatus, ProviderConfig};

        let account = Account {
            id: AccountId::from("acct-1"),
            email: "sales@example.com".to_string(),
            owner_id: UserId::from("user-1"),
            provider_type: ProviderType::Gmail,
            provider_config: ProviderConfig::Gmail {},
            credentials: vec![],
            status: AccountStatus::Connected,
            last_error: None,
            last_synced_at: None,
            inbox_id: None,
        };

        let mailbox = Credentials::Mailbox(crate::providers::email::MailboxCredentials {
            username: "sales@example.com".to_string(),
            password: "hunter2".to_string(),
        });

        let result = DefaultProviderFactory.create(&account, mailbox);
        assert!(matches!(result, Err(ProviderError::InvalidRequest(_))));
    }

    #[test]
    fn factory_requires_imap_server_config() {
        use crate::domain::{AccountStatus, ProviderConfig};

        let account = Account {
            id: AccountId::from("acct-1"),
            email: "sales@example.com".to_string(),
            owner_id: UserId::from("user-1"),
            provider_type: ProviderType::Imap,
            // Gmail config on an IMAP account: no server endpoints.
            provider_config: ProviderConfig::Gmail {},
            credentials: vec![],
            status: AccountStatus::Connected,
            last_error: None,
            last_synced_at: None,
            inbox_id: None,
        };

        let mailbox = Credentials::Mailbox(crate::providers::email::MailboxCredentials {
            username: "sales@example.com".to_string(),
            password: "hunter2".to_string(),
        });

        let result = DefaultProviderFactory.create(&account, mailbox);
        assert!(matches!(result, Err(ProviderError::InvalidRequest(_))));
    }
}
