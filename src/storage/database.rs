//! Database connection wrapper and initialization.
//!
//! Provides a thread-safe wrapper around rusqlite for async operations.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::Mutex;

use super::schema;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("column serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("blocking task failed: {0}")]
    TaskJoin(String),
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Thread-safe database connection wrapper.
///
/// A Mutex serializes access to the single connection, and every
/// operation runs via `spawn_blocking` so SQLite never blocks the async
/// runtime. Sync throughput is bounded by provider I/O, not by the store,
/// so one serialized connection is enough.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// Runs migrations to ensure the schema is up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            Ok(conn)
        })
        .await
        .map_err(|e| DatabaseError::TaskJoin(e.to_string()))??;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Opens an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(conn)
        })
        .await
        .map_err(|e| DatabaseError::TaskJoin(e.to_string()))??;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Runs all schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.blocking_lock();

            for migration in schema::all_migrations() {
                conn.execute_batch(migration)
                    .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::TaskJoin(e.to_string()))?
    }

    /// Executes a function with access to the database connection.
    ///
    /// The function runs in a blocking task to avoid blocking the async runtime.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(|e| DatabaseError::TaskJoin(e.to_string()))?
    }

    /// Executes a transaction with the given function.
    ///
    /// The transaction is committed on success or rolled back on error.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(|e| DatabaseError::TaskJoin(e.to_string()))?
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_creates_schema() {
        let db = Database::open_in_memory().await.unwrap();

        let tables: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
            })
            .await
            .unwrap();

        assert!(tables.contains(&"accounts".to_string()));
        assert!(tables.contains(&"inboxes".to_string()));
        assert!(tables.contains(&"messages".to_string()));
    }

    #[tokio::test]
    async fn with_conn_executes_query() {
        let db = Database::open_in_memory().await.unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                let count =
                    conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .unwrap();

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().await.unwrap();

        let result: Result<()> = db
            .transaction(|tx| {
                tx.execute(
                    "INSERT INTO inboxes (id, name, warmup_keywords, created_at, updated_at)
                     VALUES ('i1', 'Sales', '[]', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                    [],
                )?;
                Err(DatabaseError::Corrupt("intentional error".to_string()))
            })
            .await;

        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                let count = conn.query_row("SELECT COUNT(*) FROM inboxes", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .unwrap();

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn database_is_clone() {
        let db1 = Database::open_in_memory().await.unwrap();
        let db2 = db1.clone();

        db1.with_conn(|conn| {
            conn.execute(
                "INSERT INTO inboxes (id, name, warmup_keywords, created_at, updated_at)
                 VALUES ('i1', 'Sales', '[]', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let name: String = db2
            .with_conn(|conn| {
                let name =
                    conn.query_row("SELECT name FROM inboxes WHERE id = 'i1'", [], |row| {
                        row.get(0)
                    })?;
                Ok(name)
            })
            .await
            .unwrap();

        assert_eq!(name, "Sales");
    }
}
