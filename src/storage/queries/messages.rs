//! Message persistence and dedup-aware insertion.
//!
//! Insertion reports a duplicate instead of failing when either
//! uniqueness constraint fires, so concurrent workers that race past the
//! application-level pre-checks still converge on exactly one stored row
//! per message.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{
    AccountId, Address, InboxId, MessageId, NormalizedMessage, StoredMessage, ThreadId, UserId,
};
use crate::storage::database::{Database, Result};

/// Outcome of a message insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,
    /// A uniqueness constraint fired; an equivalent row already exists.
    Duplicate,
}

const MESSAGE_COLUMNS: &str = r#"
    id, account_id, inbox_id, thread_id, message_id, provider_ref,
    provider_thread_id, in_reply_to, references_json,
    from_address, from_name, to_addresses, cc_addresses, bcc_addresses,
    subject, body_text, body_html, received_at, attachments_json,
    is_sent, is_read, is_archived, is_filtered,
    stage, tags_json, assignee, notes_json, created_at
"#;

/// Inserts a stored message, treating uniqueness conflicts as duplicates.
pub async fn insert(db: &Database, message: &StoredMessage) -> Result<InsertOutcome> {
    let message = message.clone();

    db.with_conn(move |conn| {
        let references = serde_json::to_string(&message.message.references)?;
        let to = serde_json::to_string(&message.message.to)?;
        let cc = serde_json::to_string(&message.message.cc)?;
        let bcc = serde_json::to_string(&message.message.bcc)?;
        let attachments = serde_json::to_string(&message.message.attachments)?;
        let tags = serde_json::to_string(&message.tags)?;
        let notes = serde_json::to_string(&message.notes)?;

        let result = conn.execute(
            &format!(
                "INSERT INTO messages ({}) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28
                )",
                MESSAGE_COLUMNS
            ),
            params![
                message.id,
                message.account_id.0,
                message.inbox_id.as_ref().map(|i| i.0.clone()),
                message.thread_id.0,
                message.message.message_id.0,
                message.message.provider_ref,
                message.message.provider_thread_id,
                message.message.in_reply_to.as_ref().map(|m| m.0.clone()),
                references,
                message.message.from.email,
                message.message.from.name,
                to,
                cc,
                bcc,
                message.message.subject,
                message.message.body_text,
                message.message.body_html,
                message.message.received_at.to_rfc3339(),
                attachments,
                message.message.is_sent as i32,
                message.is_read as i32,
                message.is_archived as i32,
                message.is_filtered as i32,
                message.stage,
                tags,
                message.assignee.as_ref().map(|u| u.0.clone()),
                notes,
                message.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    })
    .await
}

/// Checks the per-account dedup tier: was this provider reference already
/// synced for this account?
pub async fn exists_provider_ref(
    db: &Database,
    account_id: &AccountId,
    provider_ref: &str,
) -> Result<bool> {
    let account_id = account_id.clone();
    let provider_ref = provider_ref.to_string();

    db.with_conn(move |conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE account_id = ?1 AND provider_ref = ?2",
            params![account_id.0, provider_ref],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    })
    .await
}

/// Checks the global dedup tier: was a message with this Message-ID
/// already stored by any account?
pub async fn exists_message_id(db: &Database, message_id: &MessageId) -> Result<bool> {
    let message_id = message_id.clone();

    db.with_conn(move |conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE message_id = ?1",
            [&message_id.0],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    })
    .await
}

/// Retrieves a stored message by its global Message-ID.
pub async fn get_by_message_id(
    db: &Database,
    message_id: &MessageId,
) -> Result<Option<StoredMessage>> {
    let message_id = message_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE message_id = ?1",
            MESSAGE_COLUMNS
        ))?;

        let result = stmt.query_row([&message_id.0], row_to_message).optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves all messages of a conversation thread, oldest first.
pub async fn get_by_thread(db: &Database, thread_id: &ThreadId) -> Result<Vec<StoredMessage>> {
    let thread_id = thread_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE thread_id = ?1 ORDER BY received_at ASC",
            MESSAGE_COLUMNS
        ))?;

        let rows = stmt.query_map([&thread_id.0], row_to_message)?;
        let messages: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(messages?)
    })
    .await
}

/// Counts messages synced for an account.
pub async fn count_for_account(db: &Database, account_id: &AccountId) -> Result<u32> {
    let account_id = account_id.clone();

    db.with_conn(move |conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE account_id = ?1",
            [&account_id.0],
            |row| row.get(0),
        )?;
        Ok(count)
    })
    .await
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> std::result::Result<T, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn timestamp_column(
    row: &Row<'_>,
    idx: usize,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_message(row: &Row<'_>) -> std::result::Result<StoredMessage, rusqlite::Error> {
    let message = NormalizedMessage {
        message_id: MessageId(row.get(4)?),
        provider_ref: row.get(5)?,
        provider_thread_id: row.get(6)?,
        in_reply_to: row.get::<_, Option<String>>(7)?.map(MessageId),
        references: json_column(row, 8)?,
        from: Address {
            email: row.get(9)?,
            name: row.get(10)?,
        },
        to: json_column(row, 11)?,
        cc: json_column(row, 12)?,
        bcc: json_column(row, 13)?,
        subject: row.get(14)?,
        body_text: row.get(15)?,
        body_html: row.get(16)?,
        received_at: timestamp_column(row, 17)?,
        attachments: json_column(row, 18)?,
        is_sent: row.get::<_, i32>(19)? != 0,
    };

    Ok(StoredMessage {
        id: row.get(0)?,
        account_id: AccountId(row.get(1)?),
        inbox_id: row.get::<_, Option<String>>(2)?.map(InboxId),
        thread_id: ThreadId(row.get(3)?),
        message,
        is_read: row.get::<_, i32>(20)? != 0,
        is_archived: row.get::<_, i32>(21)? != 0,
        is_filtered: row.get::<_, i32>(22)? != 0,
        stage: row.get(23)?,
        tags: json_column(row, 24)?,
        assignee: row.get::<_, Option<String>>(25)?.map(UserId),
        notes: json_column(row, 26)?,
        created_at: timestamp_column(row, 27)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Account, AccountStatus, Inbox, ProviderConfig, ProviderType,
    };
    use crate::storage::queries::{accounts, inboxes};

    async fn seeded_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();

        inboxes::insert(&db, &Inbox::new(InboxId::from("inbox-1"), "Sales"))
            .await
            .unwrap();

        for id in ["acct-1", "acct-2"] {
            let account = Account {
                id: AccountId::from(id),
                email: format!("{}@example.com", id),
                owner_id: UserId::from("user-1"),
                provider_type: ProviderType::Gmail,
                provider_config: ProviderConfig::Gmail {},
                credentials: vec![],
                status: AccountStatus::Connected,
                last_error: None,
                last_synced_at: None,
                inbox_id: Some(InboxId::from("inbox-1")),
            };
            accounts::insert(&db, &account).await.unwrap();
        }

        db
    }

    fn normalized(message_id: &str, provider_ref: &str) -> NormalizedMessage {
        NormalizedMessage {
            message_id: MessageId::from(message_id),
            provider_ref: provider_ref.to_string(),
            provider_thread_id: None,
            in_reply_to: None,
            references: vec![MessageId::from("<root@example.com>")],
            from: Address::with_name("alice@example.com", "Alice"),
            to: vec![Address::new("sales@example.com")],
            cc: vec![],
            bcc: vec![],
            subject: Some("Hello".to_string()),
            body_text: Some("Hi".to_string()),
            body_html: None,
            received_at: Utc::now(),
            attachments: vec![],
            is_sent: false,
        }
    }

    fn stored(account: &str, message_id: &str, provider_ref: &str) -> StoredMessage {
        StoredMessage::from_normalized(
            normalized(message_id, provider_ref),
            AccountId::from(account),
            Some(InboxId::from("inbox-1")),
            ThreadId::from("thread-1"),
            false,
            Some("new".to_string()),
        )
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let db = seeded_db().await;
        let message = stored("acct-1", "<m1@example.com>", "gm-1");

        let outcome = insert(&db, &message).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);

        let retrieved = get_by_message_id(&db, &message.message.message_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(retrieved.id, message.id);
        assert_eq!(retrieved.account_id.0, "acct-1");
        assert_eq!(retrieved.thread_id.0, "thread-1");
        assert_eq!(retrieved.message.from.name.as_deref(), Some("Alice"));
        assert_eq!(retrieved.message.references.len(), 1);
        assert_eq!(retrieved.stage.as_deref(), Some("new"));
        assert!(!retrieved.is_filtered);
    }

    #[tokio::test]
    async fn duplicate_message_id_across_accounts_is_rejected() {
        let db = seeded_db().await;

        let first = stored("acct-1", "<m1@example.com>", "gm-1");
        let second = stored("acct-2", "<m1@example.com>", "other-ref");

        assert_eq!(insert(&db, &first).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(insert(&db, &second).await.unwrap(), InsertOutcome::Duplicate);

        assert_eq!(count_for_account(&db, &AccountId::from("acct-1")).await.unwrap(), 1);
        assert_eq!(count_for_account(&db, &AccountId::from("acct-2")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_provider_ref_same_account_is_rejected() {
        let db = seeded_db().await;

        let first = stored("acct-1", "<m1@example.com>", "gm-1");
        let second = stored("acct-1", "<m2@example.com>", "gm-1");

        assert_eq!(insert(&db, &first).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(insert(&db, &second).await.unwrap(), InsertOutcome::Duplicate);
    }

    #[tokio::test]
    async fn same_provider_ref_on_different_accounts_is_fine() {
        let db = seeded_db().await;

        let first = stored("acct-1", "<m1@example.com>", "INBOX:1");
        let second = stored("acct-2", "<m2@example.com>", "INBOX:1");

        assert_eq!(insert(&db, &first).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(insert(&db, &second).await.unwrap(), InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn exists_checks_cover_both_tiers() {
        let db = seeded_db().await;
        let message = stored("acct-1", "<m1@example.com>", "gm-1");
        insert(&db, &message).await.unwrap();

        assert!(exists_message_id(&db, &MessageId::from("<m1@example.com>"))
            .await
            .unwrap());
        assert!(!exists_message_id(&db, &MessageId::from("<other@example.com>"))
            .await
            .unwrap());

        assert!(exists_provider_ref(&db, &AccountId::from("acct-1"), "gm-1")
            .await
            .unwrap());
        assert!(!exists_provider_ref(&db, &AccountId::from("acct-2"), "gm-1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn thread_query_orders_by_received_time() {
        let db = seeded_db().await;

        let mut older = stored("acct-1", "<m1@example.com>", "gm-1");
        older.message.received_at = Utc::now() - chrono::Duration::hours(2);
        let newer = stored("acct-1", "<m2@example.com>", "gm-2");

        insert(&db, &newer).await.unwrap();
        insert(&db, &older).await.unwrap();

        let thread = get_by_thread(&db, &ThreadId::from("thread-1")).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].message.message_id.0, "<m1@example.com>");
        assert_eq!(thread[1].message.message_id.0, "<m2@example.com>");
    }
}
