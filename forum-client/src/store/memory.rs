//! In-memory store for testing.
//!
//! Counts queries, allows injecting failures and accepts raw records with
//! arbitrary (or missing) timestamps.

use super::{MessageStore, StoreError};
use async_trait::async_trait;
use forum_types::{Message, MessageId, MessageQuery, NewMessage, Timestamp};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory message store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    messages: Vec<Message>,
    /// Last timestamp handed out by `insert()`.
    clock: i64,
    queries: Vec<MessageQuery>,
    /// Queries to let through before failing, and the error to fail with.
    fail_query: Option<(usize, String)>,
    fail_next_insert: Option<String>,
    fail_next_write: Option<String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a record exactly as given, bypassing id and timestamp assignment.
    pub fn insert_raw(&self, message: Message) {
        let mut inner = self.inner();
        if let Some(ts) = message.created_at {
            inner.clock = inner.clock.max(ts.as_millis());
        }
        inner.messages.push(message);
    }

    /// Snapshot of every stored record, in insertion order.
    pub fn messages(&self) -> Vec<Message> {
        self.inner().messages.clone()
    }

    /// Look up a record by id.
    pub fn get(&self, id: &MessageId) -> Option<Message> {
        self.inner().messages.iter().find(|m| &m.id == id).cloned()
    }

    /// Number of `query()` calls that reached the store.
    pub fn query_count(&self) -> usize {
        self.inner().queries.len()
    }

    /// Every query issued, in order.
    pub fn queries(&self) -> Vec<MessageQuery> {
        self.inner().queries.clone()
    }

    /// Cause the next query() to fail with the given error.
    pub fn fail_next_query(&self, error: &str) {
        self.fail_query_after(0, error);
    }

    /// Let `skip` queries succeed, then fail the one after with the given error.
    pub fn fail_query_after(&self, skip: usize, error: &str) {
        self.inner().fail_query = Some((skip, error.to_string()));
    }

    /// Cause the next insert() to fail with the given error.
    pub fn fail_next_insert(&self, error: &str) {
        self.inner().fail_next_insert = Some(error.to_string());
    }

    /// Cause the next set_flagged() or delete() to fail with the given error.
    pub fn fail_next_write(&self, error: &str) {
        self.inner().fail_next_write = Some(error.to_string());
    }

    /// Clear all records, counters and injected failures.
    pub fn reset(&self) {
        *self.inner() = MemoryStoreInner::default();
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn query(&self, query: &MessageQuery) -> Result<Vec<Message>, StoreError> {
        // Suspend like a network round-trip would
        tokio::task::yield_now().await;

        let mut inner = self.inner();
        inner.queries.push(query.clone());

        match inner.fail_query.take() {
            Some((0, error)) => return Err(StoreError::Unavailable(error)),
            Some((skip, error)) => inner.fail_query = Some((skip - 1, error)),
            None => {}
        }

        let mut matched: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(query.limit as usize);
        Ok(matched)
    }

    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut inner = self.inner();

        if let Some(error) = inner.fail_next_insert.take() {
            return Err(StoreError::Unavailable(error));
        }

        let millis = Timestamp::now().as_millis().max(inner.clock + 1);
        inner.clock = millis;

        let stored = Message::from_new(MessageId::random(), Timestamp::from_millis(millis), message);
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn set_flagged(&self, id: &MessageId, flagged: bool) -> Result<(), StoreError> {
        let mut inner = self.inner();

        if let Some(error) = inner.fail_next_write.take() {
            return Err(StoreError::Unavailable(error));
        }

        let message = inner
            .messages
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        message.flagged = flagged;
        Ok(())
    }

    async fn delete(&self, id: &MessageId) -> Result<(), StoreError> {
        let mut inner = self.inner();

        if let Some(error) = inner.fail_next_write.take() {
            return Err(StoreError::Unavailable(error));
        }

        let before = inner.messages.len();
        inner.messages.retain(|m| &m.id != id);
        if inner.messages.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}
