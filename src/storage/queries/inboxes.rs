//! Inbox CRUD operations.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Inbox, InboxId};
use crate::storage::database::{Database, Result};

/// Inserts a new inbox.
pub async fn insert(db: &Database, inbox: &Inbox) -> Result<()> {
    let inbox = inbox.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        let keywords = serde_json::to_string(&inbox.warmup_keywords)?;

        conn.execute(
            r#"
            INSERT INTO inboxes (id, name, warmup_keywords, default_stage, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![inbox.id.0, inbox.name, keywords, inbox.default_stage, now, now],
        )?;

        Ok(())
    })
    .await
}

/// Retrieves an inbox by its ID.
pub async fn get_by_id(db: &Database, inbox_id: &InboxId) -> Result<Option<Inbox>> {
    let inbox_id = inbox_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, warmup_keywords, default_stage FROM inboxes WHERE id = ?1",
        )?;

        let result = stmt.query_row([&inbox_id.0], row_to_inbox).optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves all inboxes.
pub async fn get_all(db: &Database) -> Result<Vec<Inbox>> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT id, name, warmup_keywords, default_stage FROM inboxes ORDER BY name")?;

        let rows = stmt.query_map([], row_to_inbox)?;
        let inboxes: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(inboxes?)
    })
    .await
}

/// Replaces an inbox's warmup keyword list.
pub async fn set_warmup_keywords(
    db: &Database,
    inbox_id: &InboxId,
    keywords: &[String],
) -> Result<()> {
    let inbox_id = inbox_id.clone();
    let keywords = keywords.to_vec();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        let keywords = serde_json::to_string(&keywords)?;
        conn.execute(
            "UPDATE inboxes SET warmup_keywords = ?1, updated_at = ?2 WHERE id = ?3",
            params![keywords, now, inbox_id.0],
        )?;
        Ok(())
    })
    .await
}

/// Updates an inbox's default stage for newly synced messages.
pub async fn set_default_stage(
    db: &Database,
    inbox_id: &InboxId,
    stage: Option<&str>,
) -> Result<()> {
    let inbox_id = inbox_id.clone();
    let stage = stage.map(|s| s.to_string());

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE inboxes SET default_stage = ?1, updated_at = ?2 WHERE id = ?3",
            params![stage, now, inbox_id.0],
        )?;
        Ok(())
    })
    .await
}

fn row_to_inbox(row: &Row<'_>) -> std::result::Result<Inbox, rusqlite::Error> {
    let keywords_json: String = row.get(2)?;
    let warmup_keywords = serde_json::from_str(&keywords_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Inbox {
        id: InboxId(row.get(0)?),
        name: row.get(1)?,
        warmup_keywords,
        default_stage: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get_round_trips_keywords() {
        let db = Database::open_in_memory().await.unwrap();

        let mut inbox = Inbox::new(InboxId::from("inbox-1"), "Sales");
        inbox.set_warmup_keywords(vec!["WARMUP-Tag".to_string(), "wu_".to_string()]);
        inbox.default_stage = Some("new".to_string());

        insert(&db, &inbox).await.unwrap();

        let retrieved = get_by_id(&db, &inbox.id).await.unwrap().unwrap();
        assert_eq!(retrieved.name, "Sales");
        assert_eq!(retrieved.warmup_keywords, vec!["warmup-tag", "wu_"]);
        assert_eq!(retrieved.default_stage.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn set_warmup_keywords_replaces_list() {
        let db = Database::open_in_memory().await.unwrap();
        let inbox = Inbox::new(InboxId::from("inbox-1"), "Sales");
        insert(&db, &inbox).await.unwrap();

        set_warmup_keywords(&db, &inbox.id, &["probe".to_string()])
            .await
            .unwrap();

        let retrieved = get_by_id(&db, &inbox.id).await.unwrap().unwrap();
        assert_eq!(retrieved.warmup_keywords, vec!["probe"]);
    }

    #[tokio::test]
    async fn set_default_stage_updates() {
        let db = Database::open_in_memory().await.unwrap();
        let inbox = Inbox::new(InboxId::from("inbox-1"), "Sales");
        insert(&db, &inbox).await.unwrap();

        set_default_stage(&db, &inbox.id, Some("qualified"))
            .await
            .unwrap();

        let retrieved = get_by_id(&db, &inbox.id).await.unwrap().unwrap();
        assert_eq!(retrieved.default_stage.as_deref(), Some("qualified"));
    }

    #[tokio::test]
    async fn get_all_orders_by_name() {
        let db = Database::open_in_memory().await.unwrap();
        insert(&db, &Inbox::new(InboxId::from("i2"), "Zeta")).await.unwrap();
        insert(&db, &Inbox::new(InboxId::from("i1"), "Alpha")).await.unwrap();

        let all = get_all(&db).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Alpha");
    }
}
