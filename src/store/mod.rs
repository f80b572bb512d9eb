//! Message persistence.
//!
//! The HTTP layer only sees [`Store`], used as `Arc<dyn Store>`. Two engines
//! implement it:
//!
//! - [`SqliteStore`]: the production engine, `rusqlite` on the blocking pool
//! - [`MemoryStore`]: a lock-guarded in-process table for development and tests
//!
//! Both report a unique-key violation in their own shape; mapping those onto
//! HTTP is [`HttpError::from_storage`](crate::HttpError::from_storage)'s job,
//! not the store's.

mod memory;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Message;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage failure, in the shape of the engine that raised it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite engine failure, constraint violations included.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// In-memory engine: a row with this key already exists.
    #[error("duplicate key `{0}`")]
    DuplicateKey(String),

    /// The blocking task running a storage call died.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Message storage shared by all in-flight requests.
///
/// Soft-deleted messages are invisible to [`list`](Store::list) and
/// [`find`](Store::find).
#[async_trait]
pub trait Store: Send + Sync {
    /// All live messages, oldest first.
    async fn list(&self) -> Result<Vec<Message>, StoreError>;

    /// A live message by id; `None` if it does not exist or was deleted.
    async fn find(&self, id: &str) -> Result<Option<Message>, StoreError>;

    /// Persists a new message. Fails with a duplicate-key error if the id
    /// is taken.
    async fn create(&self, message: &Message) -> Result<(), StoreError>;

    /// Soft-deletes a live message and returns it with `deleted_at` set;
    /// `None` if there was nothing to delete.
    async fn delete(&self, id: &str) -> Result<Option<Message>, StoreError>;

    /// Creates or upgrades the schema.
    async fn migrate(&self) -> Result<(), StoreError>;

    /// Cheap liveness check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}
