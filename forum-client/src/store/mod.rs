//! Message store abstraction for forum-sync.
//!
//! The synchronizer never talks to a database directly. It issues
//! [`MessageQuery`]s and writes through the [`MessageStore`] trait, so any
//! backend that can filter by visibility, range-filter on the creation
//! timestamp, order descending and apply a limit will do.
//!
//! # Contract
//!
//! - `query()` returns matching records newest first, at most `limit`
//! - `insert()` assigns the id and a strictly increasing `created_at`
//! - `set_flagged()` only touches the moderation flag
//! - `delete()` removes a record by id
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryStore::new();
//! let stored = store.insert(new_message).await?;
//! let page = store.query(&MessageQuery::public(20)).await?;
//! ```

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use forum_types::{Message, MessageId, MessageQuery, NewMessage};
use std::sync::Arc;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No record with this id.
    #[error("message not found: {0}")]
    NotFound(MessageId),

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Backend-specific failure.
    #[error("store error: {0}")]
    Backend(String),
}

/// Query and write surface of the message store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch records matching `query`, newest first.
    async fn query(&self, query: &MessageQuery) -> Result<Vec<Message>, StoreError>;

    /// Append a new record and return it as stored.
    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Set or clear the moderation flag.
    async fn set_flagged(&self, id: &MessageId, flagged: bool) -> Result<(), StoreError>;

    /// Remove a record.
    async fn delete(&self, id: &MessageId) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: MessageStore + ?Sized> MessageStore for Arc<S> {
    async fn query(&self, query: &MessageQuery) -> Result<Vec<Message>, StoreError> {
        (**self).query(query).await
    }

    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        (**self).insert(message).await
    }

    async fn set_flagged(&self, id: &MessageId, flagged: bool) -> Result<(), StoreError> {
        (**self).set_flagged(id, flagged).await
    }

    async fn delete(&self, id: &MessageId) -> Result<(), StoreError> {
        (**self).delete(id).await
    }
}
