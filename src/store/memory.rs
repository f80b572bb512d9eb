use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{Store, StoreError};
use crate::models::Message;

/// In-process message table.
///
/// Rows are kept in insertion order, deleted ones included, the same way a
/// soft-deleting SQL table keeps them.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self.rows.read().iter().filter(|m| m.deleted_at.is_none()).cloned().collect())
    }

    async fn find(&self, id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self
            .rows
            .read()
            .iter()
            .find(|m| m.id == id && m.deleted_at.is_none())
            .cloned())
    }

    async fn create(&self, message: &Message) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.iter().any(|m| m.id == message.id) {
            return Err(StoreError::DuplicateKey(message.id.clone()));
        }
        rows.push(message.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<Option<Message>, StoreError> {
        let mut rows = self.rows.write();
        let Some(row) = rows.iter_mut().find(|m| m.id == id && m.deleted_at.is_none()) else {
            return Ok(None);
        };
        row.deleted_at = Some(Utc::now());
        Ok(Some(row.clone()))
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
