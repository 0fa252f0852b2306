//! Rendering surface.
//!
//! The synchronizer decides what goes where; a [`Renderer`] puts it on a
//! screen. Implementations use interior mutability since the synchronizer
//! only holds a shared reference.

mod recording;

pub use recording::{RecordingRenderer, RenderCall};

use forum_core::{FeedEvent, Position};
use forum_types::{Message, MessageId};

/// Feed surface driven by the synchronizer.
pub trait Renderer: Send + Sync {
    /// Insert a record at `position`.
    fn insert(&self, message: &Message, position: Position);

    /// Note that `id` is now present in the feed.
    fn mark_rendered(&self, id: &MessageId);

    /// Briefly emphasise a rendered record.
    fn highlight(&self, id: &MessageId);

    /// Take a record out of the feed.
    fn remove(&self, _id: &MessageId) {}

    /// Empty the feed ahead of a full reload.
    fn clear(&self) {}

    /// Show a notification (tag badge, unread counter, whisper toast).
    fn notify(&self, _event: &FeedEvent) {}
}

impl<R: Renderer + ?Sized> Renderer for std::sync::Arc<R> {
    fn insert(&self, message: &Message, position: Position) {
        (**self).insert(message, position)
    }

    fn mark_rendered(&self, id: &MessageId) {
        (**self).mark_rendered(id)
    }

    fn highlight(&self, id: &MessageId) {
        (**self).highlight(id)
    }

    fn remove(&self, id: &MessageId) {
        (**self).remove(id)
    }

    fn clear(&self) {
        (**self).clear()
    }

    fn notify(&self, event: &FeedEvent) {
        (**self).notify(event)
    }
}
