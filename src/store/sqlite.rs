use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Store, StoreError};
use crate::models::Message;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id          TEXT PRIMARY KEY NOT NULL,
        message     TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_messages_deleted_at ON messages (deleted_at);
";

const COLUMNS: &str = "id, message, created_at, updated_at, deleted_at";

/// SQLite-backed message store.
///
/// `rusqlite` is synchronous, so every call hops onto tokio's blocking pool
/// and takes the connection lock there. One connection serializes writers,
/// which is what SQLite does anyway.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self { conn: Arc::new(Mutex::new(conn)) }
    }

    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        Ok(tokio::task::spawn_blocking(move || f(&mut conn.lock())).await??)
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        text: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        deleted_at: row.get(4)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn list(&self) -> Result<Vec<Message>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM messages WHERE deleted_at IS NULL ORDER BY rowid"
            ))?;
            let rows = stmt.query_map([], message_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn find(&self, id: &str) -> Result<Option<Message>, StoreError> {
        let id = id.to_owned();
        self.call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1 AND deleted_at IS NULL"),
                params![id],
                message_from_row,
            )
            .optional()
        })
        .await
    }

    async fn create(&self, message: &Message) -> Result<(), StoreError> {
        let message = message.clone();
        self.call(move |conn| {
            conn.execute(
                &format!("INSERT INTO messages ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    message.id,
                    message.text,
                    message.created_at,
                    message.updated_at,
                    message.deleted_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<Option<Message>, StoreError> {
        let id = id.to_owned();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE messages SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![Utc::now(), id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let message = tx.query_row(
                &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                message_from_row,
            )?;
            tx.commit()?;
            Ok(Some(message))
        })
        .await
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        self.call(|conn| conn.execute_batch(SCHEMA)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.call(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).map(drop))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn migrated() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn create_then_find_round_trips_timestamps() {
        let store = migrated().await;
        let message = Message::new("Hello there");
        store.create(&message).await.unwrap();

        let found = store.find(&message.id).await.unwrap().unwrap();
        assert_eq!(found, message);
    }

    #[tokio::test]
    async fn duplicate_primary_key_surfaces_as_constraint_failure() {
        let store = migrated().await;
        let message = Message::new("Hello there");
        store.create(&message).await.unwrap();

        let err = store.create(&message).await.unwrap_err();
        match err {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) => {
                assert_eq!(failure.code, rusqlite::ErrorCode::ConstraintViolation);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn delete_is_soft_and_single_shot() {
        let store = migrated().await;
        let message = Message::new("Hello there");
        store.create(&message).await.unwrap();

        let deleted = store.delete(&message.id).await.unwrap().unwrap();
        assert_eq!(deleted.id, message.id);
        assert!(deleted.deleted_at.is_some());

        assert_eq!(store.find(&message.id).await.unwrap(), None);
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.delete(&message.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_table_is_an_engine_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(store.list().await, Err(StoreError::Sqlite(_))));
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moc.db");

        let message = Message::new("Hello there");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.migrate().await.unwrap();
            store.create(&message).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list().await.unwrap(), vec![message]);
        store.ping().await.unwrap();
    }
}
