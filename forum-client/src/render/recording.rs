//! Recording renderer for testing.
//!
//! Captures every call and keeps a model of the feed order.

use super::Renderer;
use forum_core::{FeedEvent, Position};
use forum_types::{Message, MessageId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One call made on the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    /// `insert()`.
    Insert(MessageId, Position),
    /// `mark_rendered()`.
    MarkRendered(MessageId),
    /// `highlight()`.
    Highlight(MessageId),
    /// `remove()`.
    Remove(MessageId),
    /// `clear()`.
    Clear,
    /// `notify()`.
    Notify(FeedEvent),
}

/// Renderer that records calls instead of drawing.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    inner: Arc<Mutex<RecordingInner>>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    calls: Vec<RenderCall>,
    /// Feed model, top first.
    feed: VecDeque<Message>,
}

impl RecordingRenderer {
    /// Create an empty renderer.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, RecordingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call, in order.
    pub fn calls(&self) -> Vec<RenderCall> {
        self.inner().calls.clone()
    }

    /// Ids passed to `insert()`, in call order.
    pub fn inserted(&self) -> Vec<MessageId> {
        self.inner()
            .calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::Insert(id, _) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ids passed to `highlight()`, in call order.
    pub fn highlighted(&self) -> Vec<MessageId> {
        self.inner()
            .calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::Highlight(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Events passed to `notify()`, in call order.
    pub fn events(&self) -> Vec<FeedEvent> {
        self.inner()
            .calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::Notify(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    /// Records currently in the feed, top first.
    pub fn feed(&self) -> Vec<Message> {
        self.inner().feed.iter().cloned().collect()
    }

    /// Bodies currently in the feed, top first.
    pub fn feed_bodies(&self) -> Vec<String> {
        self.inner().feed.iter().map(|m| m.body.clone()).collect()
    }

    /// Forget all calls and empty the feed model.
    pub fn reset(&self) {
        *self.inner() = RecordingInner::default();
    }
}

impl Clone for RecordingRenderer {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Renderer for RecordingRenderer {
    fn insert(&self, message: &Message, position: Position) {
        let mut inner = self.inner();
        inner
            .calls
            .push(RenderCall::Insert(message.id.clone(), position));
        match position {
            Position::Top => inner.feed.push_front(message.clone()),
            Position::Bottom => inner.feed.push_back(message.clone()),
        }
    }

    fn mark_rendered(&self, id: &MessageId) {
        self.inner().calls.push(RenderCall::MarkRendered(id.clone()));
    }

    fn highlight(&self, id: &MessageId) {
        self.inner().calls.push(RenderCall::Highlight(id.clone()));
    }

    fn remove(&self, id: &MessageId) {
        let mut inner = self.inner();
        inner.calls.push(RenderCall::Remove(id.clone()));
        inner.feed.retain(|m| &m.id != id);
    }

    fn clear(&self) {
        let mut inner = self.inner();
        inner.calls.push(RenderCall::Clear);
        inner.feed.clear();
    }

    fn notify(&self, event: &FeedEvent) {
        self.inner().calls.push(RenderCall::Notify(event.clone()));
    }
}
