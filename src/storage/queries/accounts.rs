//! Account CRUD and sync lifecycle operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Account, AccountId, AccountStatus, InboxId, ProviderType, UserId};
use crate::storage::database::{Database, DatabaseError, Result};

const ACCOUNT_COLUMNS: &str = r#"
    id, email, owner_id, provider_type, provider_config,
    credentials, status, last_error, last_synced_at, inbox_id
"#;

/// Inserts a new account.
pub async fn insert(db: &Database, account: &Account) -> Result<()> {
    let account = account.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        let provider_config = serde_json::to_string(&account.provider_config)?;

        conn.execute(
            r#"
            INSERT INTO accounts (
                id, email, owner_id, provider_type, provider_config,
                credentials, status, last_error, last_synced_at, inbox_id,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12
            )
            "#,
            params![
                account.id.0,
                account.email,
                account.owner_id.0,
                account.provider_type.as_str(),
                provider_config,
                account.credentials,
                account.status.as_str(),
                account.last_error,
                account.last_synced_at.map(|d| d.to_rfc3339()),
                account.inbox_id.as_ref().map(|i| i.0.clone()),
                now,
                now,
            ],
        )?;

        Ok(())
    })
    .await
}

/// Retrieves an account by its ID.
pub async fn get_by_id(db: &Database, account_id: &AccountId) -> Result<Option<Account>> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE id = ?1",
            ACCOUNT_COLUMNS
        ))?;

        let result = stmt.query_row([&account_id.0], row_to_account).optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves all accounts.
pub async fn get_all(db: &Database) -> Result<Vec<Account>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts ORDER BY email",
            ACCOUNT_COLUMNS
        ))?;

        let rows = stmt.query_map([], row_to_account)?;
        let accounts: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(accounts?)
    })
    .await
}

/// Retrieves accounts owned by one tenant user.
pub async fn get_by_owner(db: &Database, owner_id: &UserId) -> Result<Vec<Account>> {
    let owner_id = owner_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE owner_id = ?1 ORDER BY email",
            ACCOUNT_COLUMNS
        ))?;

        let rows = stmt.query_map([&owner_id.0], row_to_account)?;
        let accounts: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(accounts?)
    })
    .await
}

/// Retrieves accounts eligible for scheduled sync: connected, and assigned
/// to a destination inbox. Errored accounts are retried; disconnected and
/// unassigned accounts are skipped.
pub async fn get_eligible(db: &Database) -> Result<Vec<Account>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM accounts
            WHERE status IN ('connected', 'error') AND inbox_id IS NOT NULL
            ORDER BY email
            "#,
            ACCOUNT_COLUMNS
        ))?;

        let rows = stmt.query_map([], row_to_account)?;
        let accounts: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(accounts?)
    })
    .await
}

/// Replaces an account's encrypted credential blob.
///
/// Called immediately when a provider hands back refreshed credentials;
/// losing a rotated token pair would strand the account.
pub async fn update_credentials(
    db: &Database,
    account_id: &AccountId,
    credentials: Vec<u8>,
) -> Result<()> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE accounts SET credentials = ?1, updated_at = ?2 WHERE id = ?3",
            params![credentials, now, account_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Records a successful sync run: advances the checkpoint and clears any
/// previous error state.
pub async fn mark_synced(
    db: &Database,
    account_id: &AccountId,
    checkpoint: DateTime<Utc>,
) -> Result<()> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            UPDATE accounts
            SET last_synced_at = ?1, status = 'connected', last_error = NULL, updated_at = ?2
            WHERE id = ?3
            "#,
            params![checkpoint.to_rfc3339(), now, account_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Records a failed sync run. The checkpoint is left untouched so the
/// failed window is retried.
pub async fn mark_error(db: &Database, account_id: &AccountId, error: &str) -> Result<()> {
    let account_id = account_id.clone();
    let error = error.to_string();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE accounts SET status = 'error', last_error = ?1, updated_at = ?2 WHERE id = ?3",
            params![error, now, account_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Updates an account's status directly (connect/disconnect flows).
pub async fn set_status(db: &Database, account_id: &AccountId, status: AccountStatus) -> Result<()> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE accounts SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, account_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Assigns (or clears) the destination inbox for an account.
pub async fn set_inbox(
    db: &Database,
    account_id: &AccountId,
    inbox_id: Option<&InboxId>,
) -> Result<()> {
    let account_id = account_id.clone();
    let inbox_id = inbox_id.map(|i| i.0.clone());

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE accounts SET inbox_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![inbox_id, now, account_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Deletes an account and all of its synced messages.
pub async fn delete(db: &Database, account_id: &AccountId) -> Result<()> {
    let account_id = account_id.clone();

    db.transaction(move |tx| {
        tx.execute("DELETE FROM messages WHERE account_id = ?1", [&account_id.0])?;
        tx.execute("DELETE FROM accounts WHERE id = ?1", [&account_id.0])?;
        Ok(())
    })
    .await
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn row_to_account(row: &Row<'_>) -> std::result::Result<Account, rusqlite::Error> {
    let provider_type_str: String = row.get(3)?;
    let provider_config_json: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    let last_synced_at: Option<String> = row.get(8)?;

    let provider_type = ProviderType::parse(&provider_type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            DatabaseError::Corrupt(format!("unknown provider type: {}", provider_type_str)).into(),
        )
    })?;

    let status = AccountStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            DatabaseError::Corrupt(format!("unknown account status: {}", status_str)).into(),
        )
    })?;

    let provider_config = serde_json::from_str(&provider_config_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Account {
        id: AccountId(row.get(0)?),
        email: row.get(1)?,
        owner_id: UserId(row.get(2)?),
        provider_type,
        provider_config,
        credentials: row.get(5)?,
        status,
        last_error: row.get(7)?,
        last_synced_at: last_synced_at.as_deref().map(parse_timestamp).transpose()?,
        inbox_id: row.get::<_, Option<String>>(9)?.map(InboxId),
    })
}
