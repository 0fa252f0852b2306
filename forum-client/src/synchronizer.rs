//! Synchronizer - keeps a rendered feed in step with the message store.
//!
//! [`Synchronizer`] owns the feed state for one viewer and polls the store
//! for records newer than its watermarks.
//!
//! # Architecture
//!
//! The synchronizer uses the pure feed state machine (from forum-core) for
//! all bookkeeping and interprets the actions it returns by calling the
//! [`Renderer`].
//!
//! ```text
//! Poller → Synchronizer → MessageStore
//!               ↓    ↘
//!        forum-core   Renderer
//! ```
//!
//! # Poll cycles
//!
//! A cycle checks the public stream, then the private stream. At most one
//! cycle runs at a time: a second [`Synchronizer::poll_for_new_messages`]
//! while one is in flight returns [`CycleOutcome::Skipped`] without touching
//! the store. A failing store aborts the cycle, leaves the watermarks where
//! they were and is only logged.
//!
//! # Example
//!
//! ```ignore
//! let sync = Synchronizer::new(store, renderer, viewer, SyncConfig::default());
//! sync.load_initial().await?;
//! sync.poll_for_new_messages().await;
//! ```

use forum_core::{
    Action, Batch, BatchKind, ComposeError, Draft, FeedState, Stream, SyncWatermark, Viewer,
};
use forum_types::{Message, MessageId, MessageQuery, Timestamp};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::SyncConfig;
use crate::render::Renderer;
use crate::store::{MessageStore, StoreError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The draft was rejected before reaching the store.
    #[error("invalid message: {0}")]
    Compose(#[from] ComposeError),

    /// Only the author may delete a message.
    #[error("cannot delete {0}: not the author")]
    NotAuthor(MessageId),

    /// The background poller is no longer running.
    #[error("poll scheduler stopped")]
    SchedulerStopped,
}

/// Result of one [`Synchronizer::poll_for_new_messages`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was in flight; nothing was queried.
    Skipped,
    /// Both streams were polled.
    Completed {
        /// Public records inserted.
        public: usize,
        /// Private records inserted.
        private: usize,
    },
    /// The store failed; the cycle stopped at `stream`.
    Failed {
        /// Stream whose query failed.
        stream: Stream,
    },
}

/// Point-in-time view of the feed bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStatus {
    /// Current watermarks.
    pub watermarks: SyncWatermark,
    /// Records present in the feed.
    pub rendered: usize,
    /// Tagged messages tracked.
    pub tagged: usize,
    /// Unread counter.
    pub unread: u32,
    /// Whether older public pages may remain.
    pub older_available: bool,
    /// Poll cycles started so far.
    pub cycles: u64,
}

/// Clears an in-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The message synchronizer.
///
/// Generic over the store and renderer so tests can use
/// [`MemoryStore`](crate::MemoryStore) and
/// [`RecordingRenderer`](crate::RecordingRenderer).
pub struct Synchronizer<S: MessageStore, R: Renderer> {
    store: S,
    renderer: R,
    config: SyncConfig,
    viewer: Viewer,
    state: Mutex<FeedState>,
    /// Re-entrancy guard: held for the whole of a poll cycle or reload.
    cycle: Mutex<()>,
    older_in_flight: AtomicBool,
    /// Bumped on every reload so stale older pages are dropped.
    generation: AtomicU64,
    cycles: AtomicU64,
}

impl<S: MessageStore, R: Renderer> Synchronizer<S, R> {
    /// Create a synchronizer for `viewer` with an empty feed.
    pub fn new(store: S, renderer: R, viewer: Viewer, config: SyncConfig) -> Self {
        let state = FeedState::new(viewer.clone(), config.feed_settings());
        Self {
            store,
            renderer,
            config,
            viewer,
            state: Mutex::new(state),
            cycle: Mutex::new(()),
            older_in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
        }
    }

    /// The viewer the feed is rendered for.
    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a reference to the renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Current watermarks.
    pub async fn watermarks(&self) -> SyncWatermark {
        self.state.lock().await.watermarks()
    }

    /// Number of tagged messages tracked.
    pub async fn tagged_count(&self) -> usize {
        self.state.lock().await.tagged_count()
    }

    /// Current unread counter.
    pub async fn unread(&self) -> u32 {
        self.state.lock().await.unread()
    }

    /// Snapshot of the feed bookkeeping.
    pub async fn status(&self) -> FeedStatus {
        let state = self.state.lock().await;
        FeedStatus {
            watermarks: state.watermarks(),
            rendered: state.rendered_count(),
            tagged: state.tagged_count(),
            unread: state.unread(),
            older_available: state.older_query().is_some(),
            cycles: self.cycles.load(Ordering::Relaxed),
        }
    }

    // ===========================================
    // Polling
    // ===========================================

    /// Run one poll cycle: public stream, then private stream.
    ///
    /// Never returns an error. Failures are logged and reported through
    /// [`CycleOutcome::Failed`]; the watermark of the failed stream is left
    /// unchanged so the next cycle retries the same range.
    pub async fn poll_for_new_messages(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle.try_lock() else {
            tracing::debug!("Poll cycle already in flight, skipping");
            return CycleOutcome::Skipped;
        };

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(cycle, "Poll cycle started");

        let public = match self.poll_stream(Stream::Public).await {
            Ok(inserted) => inserted,
            Err(e) => {
                tracing::warn!(cycle, stream = %Stream::Public, error = %e, "Poll failed");
                return CycleOutcome::Failed {
                    stream: Stream::Public,
                };
            }
        };

        let private = match self.poll_stream(Stream::Private).await {
            Ok(inserted) => inserted,
            Err(e) => {
                tracing::warn!(cycle, stream = %Stream::Private, error = %e, "Poll failed");
                return CycleOutcome::Failed {
                    stream: Stream::Private,
                };
            }
        };

        tracing::debug!(cycle, public, private, "Poll cycle finished");
        CycleOutcome::Completed { public, private }
    }

    /// Poll the public stream once and return how many records were inserted.
    ///
    /// Subject to the same guard as a full cycle: returns 0 without querying
    /// if a cycle is in flight. A store failure is logged, leaves the
    /// watermark unchanged and also yields 0.
    pub async fn poll_public(&self) -> usize {
        self.poll_single(Stream::Public).await
    }

    /// Poll the viewer's private stream once.
    ///
    /// Same contract as [`Synchronizer::poll_public`].
    pub async fn poll_private(&self) -> usize {
        self.poll_single(Stream::Private).await
    }

    async fn poll_single(&self, stream: Stream) -> usize {
        let Ok(_guard) = self.cycle.try_lock() else {
            tracing::debug!(%stream, "Poll already in flight, skipping");
            return 0;
        };
        match self.poll_stream(stream).await {
            Ok(inserted) => inserted,
            Err(e) => {
                tracing::warn!(%stream, error = %e, "Poll failed");
                0
            }
        }
    }

    async fn poll_stream(&self, stream: Stream) -> Result<usize, ClientError> {
        let (query, mark) = {
            let state = self.state.lock().await;
            (state.poll_query(stream), state.watermarks().get(stream).last())
        };
        let records = self.store.query(&query).await?;
        if page_may_be_truncated(&query, mark, &records) {
            tracing::warn!(
                %stream,
                limit = query.limit,
                "Poll returned a full page of new records, some may have been cut off"
            );
        }

        let actions = self
            .state
            .lock()
            .await
            .apply(Batch::new(stream, BatchKind::Poll, records));
        Ok(self.dispatch(actions))
    }

    // ===========================================
    // Loading
    // ===========================================

    /// Load the newest public and private messages into an empty feed.
    ///
    /// Waits for any in-flight cycle. Both streams are fetched before
    /// anything is rendered, so a failure leaves the feed untouched.
    pub async fn load_initial(&self) -> Result<usize, ClientError> {
        let _guard = self.cycle.lock().await;
        self.load_initial_locked().await
    }

    /// Forget everything and reload from scratch.
    ///
    /// Both watermarks are reset, the feed is cleared and the newest
    /// messages are fetched again. Errors are returned to the caller.
    pub async fn refresh(&self) -> Result<usize, ClientError> {
        let _guard = self.cycle.lock().await;
        tracing::info!("Refreshing feed");

        let actions = {
            let mut state = self.state.lock().await;
            self.generation.fetch_add(1, Ordering::AcqRel);
            state.reset()
        };
        self.dispatch(actions);

        let inserted = self.load_initial_locked().await.inspect_err(|e| {
            tracing::warn!(error = %e, "Refresh failed");
        })?;
        tracing::info!(inserted, "Feed refreshed");
        Ok(inserted)
    }

    async fn load_initial_locked(&self) -> Result<usize, ClientError> {
        let (public_query, private_query) = {
            let state = self.state.lock().await;
            (
                state.initial_query(Stream::Public),
                state.initial_query(Stream::Private),
            )
        };

        let public = self.store.query(&public_query).await?;
        let private = self.store.query(&private_query).await?;

        let actions = {
            let mut state = self.state.lock().await;
            let mut actions = state.apply(Batch::new(Stream::Public, BatchKind::Initial, public));
            actions.extend(state.apply(Batch::new(Stream::Private, BatchKind::Initial, private)));
            actions
        };
        Ok(self.dispatch(actions))
    }

    /// Append the next page of older public messages.
    ///
    /// Returns `Ok(0)` when paging is exhausted, nothing has been loaded yet,
    /// or another page is already being fetched.
    pub async fn load_older(&self) -> Result<usize, ClientError> {
        if self.older_in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("Older page already in flight");
            return Ok(0);
        }
        let _in_flight = InFlight(&self.older_in_flight);

        let (query, generation) = {
            let state = self.state.lock().await;
            match state.older_query() {
                Some(query) => (query, self.generation.load(Ordering::Acquire)),
                None => return Ok(0),
            }
        };

        let records = self.store.query(&query).await?;

        let actions = {
            let mut state = self.state.lock().await;
            if self.generation.load(Ordering::Acquire) != generation {
                tracing::debug!("Feed reloaded while fetching older page, discarding");
                return Ok(0);
            }
            state.apply(Batch::new(Stream::Public, BatchKind::Older, records))
        };
        Ok(self.dispatch(actions))
    }

    // ===========================================
    // Writes
    // ===========================================

    /// Validate and store a new message.
    ///
    /// The stored record is not rendered here; it shows up with the next
    /// poll (see [`PollerHandle::notify_sent`](crate::PollerHandle::notify_sent)).
    pub async fn send(&self, draft: Draft) -> Result<Message, ClientError> {
        let new = draft.into_new_message(&self.viewer)?;
        let stored = self.store.insert(new).await?;
        tracing::debug!(id = %stored.id, private = stored.is_private, "Message sent");
        Ok(stored)
    }

    /// Flag a message for moderation.
    pub async fn flag(&self, id: &MessageId) -> Result<(), ClientError> {
        self.store.set_flagged(id, true).await?;
        tracing::info!(%id, "Message flagged");
        Ok(())
    }

    /// Delete one of the viewer's own messages and remove it from the feed.
    ///
    /// Messages rendered from other authors are refused without contacting
    /// the store.
    pub async fn delete(&self, id: &MessageId) -> Result<(), ClientError> {
        {
            let state = self.state.lock().await;
            if let Some(author) = state.author_of(id) {
                if *author != self.viewer.user_id {
                    return Err(ClientError::NotAuthor(id.clone()));
                }
            }
        }

        self.store.delete(id).await?;
        tracing::info!(%id, "Message deleted");

        let actions = self.state.lock().await.forget(id);
        self.dispatch(actions);
        Ok(())
    }

    // ===========================================
    // View state
    // ===========================================

    /// Record whether the viewer has scrolled away from the newest messages.
    pub async fn set_scrolled_away(&self, away: bool) {
        let actions = self.state.lock().await.set_scrolled_away(away);
        self.dispatch(actions);
    }

    /// Highlight the newest message that mentions the viewer.
    pub async fn jump_to_tagged(&self) -> Option<MessageId> {
        let action = self.state.lock().await.jump_to_tagged()?;
        let id = match &action {
            Action::Highlight(id) => Some(id.clone()),
            _ => None,
        };
        self.dispatch(vec![action]);
        id
    }

    /// Carry out actions; returns the number of records inserted.
    fn dispatch(&self, actions: Vec<Action>) -> usize {
        let mut inserted = 0;
        for action in actions {
            match action {
                Action::Insert { message, position } => {
                    self.renderer.insert(&message, position);
                    inserted += 1;
                }
                Action::MarkRendered(id) => self.renderer.mark_rendered(&id),
                Action::Highlight(id) => self.renderer.highlight(&id),
                Action::Remove(id) => self.renderer.remove(&id),
                Action::ClearFeed => self.renderer.clear(),
                Action::SkipMalformed(id) => {
                    tracing::warn!(%id, "Skipping record without timestamp");
                }
                Action::Emit(event) => {
                    tracing::debug!(?event, "Feed event");
                    self.renderer.notify(&event);
                }
            }
        }
        inserted
    }
}

/// Whether a poll page may have dropped new records at its lower end.
///
/// Pages come newest first, so the limit cuts the oldest records off. If
/// the page reached back to the watermark (a record re-read through the
/// overlap window), everything newer than the watermark fitted.
fn page_may_be_truncated(
    query: &MessageQuery,
    watermark: Option<Timestamp>,
    records: &[Message],
) -> bool {
    if query.limit == 0 || records.len() < query.limit as usize {
        return false;
    }
    let reached_watermark = match watermark {
        Some(mark) => records
            .iter()
            .any(|m| m.created_at.is_some_and(|t| t <= mark)),
        None => false,
    };
    !reached_watermark
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RecordingRenderer, RenderCall};
    use crate::store::MemoryStore;
    use forum_core::{extract_mentions, FeedEvent, Position};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Notify;
    use forum_types::{NewMessage, RoleTag, UserId};

    type TestSync = Synchronizer<MemoryStore, RecordingRenderer>;

    fn bob() -> Viewer {
        Viewer::new(UserId::new("uid-bob"), "Bob", RoleTag::Student)
    }

    fn setup() -> (TestSync, MemoryStore, RecordingRenderer) {
        let store = MemoryStore::new();
        let renderer = RecordingRenderer::new();
        let sync = Synchronizer::new(
            store.clone(),
            renderer.clone(),
            bob(),
            SyncConfig::default(),
        );
        (sync, store, renderer)
    }

    fn raw(id: &str, ts: Option<i64>, body: &str, to: Option<&str>, from: &str) -> Message {
        let mut message = Message::from_new(
            MessageId::new(id),
            Timestamp::from_millis(0),
            NewMessage {
                author_id: UserId::new(from),
                author_name: from.trim_start_matches("uid-").to_string(),
                author_role: RoleTag::User,
                body: body.to_string(),
                recipient_id: to.map(UserId::new),
                recipient_name: to.map(|_| "Bob".to_string()),
                reply_to_id: None,
                reply_to_name: None,
                mentions: extract_mentions(body),
                images: vec![],
            },
        );
        message.created_at = ts.map(Timestamp::from_millis);
        message
    }

    fn public_at(id: &str, ts: i64, body: &str) -> Message {
        raw(id, Some(ts), body, None, "uid-alice")
    }

    fn ids(ids: &[&str]) -> Vec<MessageId> {
        ids.iter().map(|id| MessageId::new(*id)).collect()
    }

    fn ts(millis: i64) -> Option<Timestamp> {
        Some(Timestamp::from_millis(millis))
    }

    // ===========================================
    // Poll Scenarios
    // ===========================================

    #[test]
    fn truncation_check_ignores_overlap_rereads() {
        let query = MessageQuery::public(3);
        let page = |times: &[i64]| -> Vec<Message> {
            times
                .iter()
                .map(|t| public_at(&format!("m{}", t), *t, "x"))
                .collect()
        };

        // Every record is new: older ones may be missing
        assert!(page_may_be_truncated(&query, ts(10), &page(&[13, 12, 11])));
        // The page reached back into the overlap window
        assert!(!page_may_be_truncated(&query, ts(10), &page(&[12, 11, 9])));
        assert!(!page_may_be_truncated(&query, ts(10), &page(&[12, 11, 10])));
        // Not full
        assert!(!page_may_be_truncated(&query, ts(10), &page(&[12, 11])));
        // First poll with a full page
        assert!(page_may_be_truncated(&query, None, &page(&[3, 2, 1])));
    }

    #[tokio::test]
    async fn unset_watermark_renders_in_order() {
        let (sync, store, renderer) = setup();
        store.insert_raw(public_at("t2", 2, "second"));
        store.insert_raw(public_at("t1", 1, "first"));
        store.insert_raw(public_at("t3", 3, "third"));

        let inserted = sync.poll_public().await;

        assert_eq!(inserted, 3);
        assert_eq!(renderer.inserted(), ids(&["t1", "t2", "t3"]));
        assert_eq!(renderer.feed_bodies(), vec!["third", "second", "first"]);
        assert_eq!(sync.watermarks().await.public.last(), ts(3));
    }

    #[tokio::test]
    async fn new_mention_is_tagged() {
        let (sync, store, renderer) = setup();
        for (id, t) in [("t1", 1), ("t2", 2), ("t3", 3)] {
            store.insert_raw(public_at(id, t, "chatter"));
        }
        sync.poll_for_new_messages().await;
        assert_eq!(sync.tagged_count().await, 0);

        store.insert_raw(public_at("t4", 4, "@Bob have a look"));
        let outcome = sync.poll_for_new_messages().await;

        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                public: 1,
                private: 0
            }
        );
        assert_eq!(sync.tagged_count().await, 1);
        assert!(renderer.events().contains(&FeedEvent::Tagged {
            id: MessageId::new("t4"),
            total: 1
        }));
        assert_eq!(sync.watermarks().await.public.last(), ts(4));
    }

    #[tokio::test]
    async fn failed_query_is_swallowed() {
        let (sync, store, renderer) = setup();
        store.insert_raw(public_at("t1", 1, "a"));
        sync.poll_for_new_messages().await;
        let before = sync.watermarks().await;

        store.insert_raw(public_at("t2", 2, "b"));
        store.fail_next_query("network down");
        let outcome = sync.poll_for_new_messages().await;

        assert_eq!(
            outcome,
            CycleOutcome::Failed {
                stream: Stream::Public
            }
        );
        assert_eq!(sync.watermarks().await, before);
        assert_eq!(renderer.inserted(), ids(&["t1"]));

        // Guard was released; the next cycle picks up the missed range
        let outcome = sync.poll_for_new_messages().await;
        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                public: 1,
                private: 0
            }
        );
        assert_eq!(renderer.inserted(), ids(&["t1", "t2"]));
    }

    #[tokio::test]
    async fn single_stream_failure_is_swallowed() {
        let (sync, store, renderer) = setup();
        store.insert_raw(public_at("t1", 1, "a"));
        store.insert_raw(raw("w1", Some(2), "psst", Some("uid-bob"), "uid-carol"));

        store.fail_next_query("down");
        assert_eq!(sync.poll_public().await, 0);
        store.fail_next_query("down");
        assert_eq!(sync.poll_private().await, 0);

        let marks = sync.watermarks().await;
        assert!(!marks.public.is_set());
        assert!(!marks.private.is_set());
        assert!(renderer.calls().is_empty());

        // Guard released; the same ranges are retried
        assert_eq!(sync.poll_public().await, 1);
        assert_eq!(sync.poll_private().await, 1);
        assert_eq!(sync.watermarks().await.public.last(), ts(1));
    }

    #[tokio::test]
    async fn failed_private_query_keeps_public_progress() {
        let (sync, store, renderer) = setup();
        store.insert_raw(public_at("t1", 1, "a"));
        store.insert_raw(raw("w1", Some(2), "psst", Some("uid-bob"), "uid-carol"));

        // Public query succeeds, private one fails
        store.fail_query_after(1, "flaky");
        let outcome = sync.poll_for_new_messages().await;

        assert_eq!(
            outcome,
            CycleOutcome::Failed {
                stream: Stream::Private
            }
        );
        let marks = sync.watermarks().await;
        assert_eq!(marks.public.last(), ts(1));
        assert!(!marks.private.is_set());
        assert_eq!(renderer.inserted(), ids(&["t1"]));

        // Next cycle fetches the whisper without re-rendering the public record
        let outcome = sync.poll_for_new_messages().await;
        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                public: 0,
                private: 1
            }
        );
        assert_eq!(renderer.inserted(), ids(&["t1", "w1"]));
        assert_eq!(sync.watermarks().await.private.last(), ts(2));
    }

    #[tokio::test]
    async fn concurrent_cycles_issue_one_query_pair() {
        let (sync, store, _renderer) = setup();

        let (first, second) = tokio::join!(
            sync.poll_for_new_messages(),
            sync.poll_for_new_messages()
        );

        assert_eq!(store.query_count(), 2);
        assert!(matches!(first, CycleOutcome::Completed { .. }));
        assert_eq!(second, CycleOutcome::Skipped);
        assert_eq!(sync.status().await.cycles, 1);
    }

    #[tokio::test]
    async fn single_stream_poll_respects_guard() {
        let (sync, store, _renderer) = setup();

        let (cycle, single) = tokio::join!(sync.poll_for_new_messages(), sync.poll_public());

        assert!(matches!(cycle, CycleOutcome::Completed { .. }));
        assert_eq!(single, 0);
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn overlapping_polls_never_render_twice() {
        let (sync, store, renderer) = setup();
        let mut t = 1_000;
        for round in 0..5 {
            for n in 0..3 {
                t += 100;
                store.insert_raw(public_at(&format!("r{}-{}", round, n), t, "x"));
            }
            sync.poll_for_new_messages().await;
        }

        let inserted = renderer.inserted();
        let mut unique = inserted.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(inserted.len(), 15);
        assert_eq!(unique.len(), 15);

        // Overlap re-reads earlier records: queries start below the watermark
        let last = store.queries().last().cloned().unwrap();
        assert_eq!(last.visibility, forum_types::Visibility::PrivateTo(UserId::new("uid-bob")));
        let public_queries: Vec<_> = store
            .queries()
            .into_iter()
            .filter(|q| q.visibility == forum_types::Visibility::Public)
            .collect();
        assert_eq!(public_queries[0].after, None);
        assert_eq!(public_queries[1].after, ts(1_300 - 2_000));
    }

    #[tokio::test]
    async fn cycle_inserts_in_non_decreasing_order() {
        let (sync, store, renderer) = setup();
        // Equal timestamps and insertion order unrelated to time
        store.insert_raw(public_at("c", 30, "c"));
        store.insert_raw(public_at("a", 10, "a"));
        store.insert_raw(public_at("b1", 20, "b1"));
        store.insert_raw(public_at("b2", 20, "b2"));

        sync.poll_for_new_messages().await;

        let feed = renderer.feed();
        let inserted_times: Vec<_> = renderer
            .inserted()
            .iter()
            .map(|id| feed.iter().find(|m| &m.id == id).unwrap().created_at)
            .collect();
        assert!(inserted_times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn watermark_never_decreases_across_cycles() {
        let (sync, store, _renderer) = setup();
        let mut previous = None;

        for (id, t) in [("a", 50), ("b", 40), ("c", 60), ("d", 55)] {
            store.insert_raw(public_at(id, t, "x"));
            sync.poll_for_new_messages().await;
            let current = sync.watermarks().await.public.last();
            assert!(current >= previous);
            previous = current;
        }
        assert_eq!(previous, ts(60));
    }

    #[tokio::test]
    async fn record_without_timestamp_is_skipped() {
        let (sync, store, renderer) = setup();
        store.insert_raw(public_at("ok", 5, "fine"));
        store.insert_raw(raw("pending", None, "no time yet", None, "uid-alice"));

        // Unbounded first poll returns the malformed record too
        sync.poll_public().await;

        assert_eq!(renderer.inserted(), ids(&["ok"]));
        assert_eq!(sync.watermarks().await.public.last(), ts(5));
    }

    #[tokio::test]
    async fn whisper_polled_with_own_watermark() {
        let (sync, store, renderer) = setup();
        store.insert_raw(raw("w1", Some(7), "psst", Some("uid-bob"), "uid-carol"));
        store.insert_raw(raw("w2", Some(8), "not yours", Some("uid-dave"), "uid-carol"));

        let outcome = sync.poll_for_new_messages().await;

        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                public: 0,
                private: 1
            }
        );
        assert_eq!(renderer.inserted(), ids(&["w1"]));
        assert!(renderer.events().contains(&FeedEvent::WhisperReceived {
            id: MessageId::new("w1"),
            from: "carol".into()
        }));
        let marks = sync.watermarks().await;
        assert!(!marks.public.is_set());
        assert_eq!(marks.private.last(), ts(7));
    }

    #[tokio::test]
    async fn polled_messages_are_highlighted() {
        let (sync, store, renderer) = setup();
        store.insert_raw(public_at("m1", 1, "hi"));

        sync.poll_public().await;

        assert_eq!(
            renderer.calls(),
            vec![
                RenderCall::Insert(MessageId::new("m1"), Position::Top),
                RenderCall::MarkRendered(MessageId::new("m1")),
                RenderCall::Highlight(MessageId::new("m1")),
            ]
        );
    }

    // ===========================================
    // Refresh and Paging
    // ===========================================

    #[tokio::test]
    async fn refresh_resets_and_reloads() {
        let (sync, store, renderer) = setup();
        store.insert_raw(public_at("m1", 100, "one"));
        sync.poll_for_new_messages().await;

        // A record the overlap window would never reach again
        store.insert_raw(public_at("late", 10, "late arrival"));
        store.insert_raw(raw("w1", Some(90), "psst", Some("uid-bob"), "uid-carol"));

        let inserted = sync.refresh().await.unwrap();

        assert_eq!(inserted, 3);
        assert!(renderer.calls().contains(&RenderCall::Clear));
        assert_eq!(renderer.feed_bodies(), vec!["psst", "one", "late arrival"]);
        let marks = sync.watermarks().await;
        assert_eq!(marks.public.last(), ts(100));
        assert_eq!(marks.private.last(), ts(90));
    }

    #[tokio::test]
    async fn refresh_on_empty_store_unsets_watermarks() {
        let (sync, store, _renderer) = setup();
        store.insert_raw(public_at("m1", 100, "one"));
        sync.poll_for_new_messages().await;
        store.reset();

        sync.refresh().await.unwrap();

        let marks = sync.watermarks().await;
        assert!(!marks.public.is_set());
        assert!(!marks.private.is_set());
    }

    #[tokio::test]
    async fn refresh_failure_is_returned() {
        let (sync, store, _renderer) = setup();
        store.fail_next_query("offline");

        let result = sync.refresh().await;

        assert!(matches!(result, Err(ClientError::Store(_))));
        // Guard released
        assert!(matches!(
            sync.poll_for_new_messages().await,
            CycleOutcome::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn initial_load_then_older_pages() {
        let (sync, store, renderer) = setup();
        for t in 1..=25 {
            store.insert_raw(public_at(&format!("m{:02}", t), t, "x"));
        }

        let inserted = sync.load_initial().await.unwrap();
        assert_eq!(inserted, 20);
        assert_eq!(renderer.feed().first().unwrap().id, MessageId::new("m25"));
        assert_eq!(renderer.feed().last().unwrap().id, MessageId::new("m06"));

        assert_eq!(sync.load_older().await.unwrap(), 5);
        assert_eq!(renderer.feed().last().unwrap().id, MessageId::new("m01"));
        assert!(sync.status().await.older_available);

        // Empty page ends paging
        assert_eq!(sync.load_older().await.unwrap(), 0);
        assert!(!sync.status().await.older_available);
        assert_eq!(sync.load_older().await.unwrap(), 0);
        assert_eq!(store.query_count(), 4);
    }

    #[tokio::test]
    async fn initial_load_failure_renders_nothing() {
        let (sync, store, renderer) = setup();
        store.insert_raw(public_at("m1", 1, "x"));
        store.fail_next_query("offline");

        assert!(sync.load_initial().await.is_err());
        assert!(renderer.calls().is_empty());
        assert!(!sync.watermarks().await.public.is_set());
    }

    // ===========================================
    // Writes and View State
    // ===========================================

    #[tokio::test]
    async fn sent_message_arrives_with_next_poll() {
        let (sync, store, renderer) = setup();

        let stored = sync.send(Draft::new("hello everyone")).await.unwrap();
        assert_eq!(stored.author_name, "Bob");
        assert_eq!(stored.author_role, RoleTag::Student);
        assert!(renderer.inserted().is_empty());

        sync.poll_for_new_messages().await;
        assert_eq!(renderer.inserted(), vec![stored.id.clone()]);
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn invalid_draft_never_reaches_store() {
        let (sync, store, _renderer) = setup();

        let result = sync.send(Draft::new("   ")).await;

        assert!(matches!(result, Err(ClientError::Compose(ComposeError::Empty))));
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_returned() {
        let (sync, store, _renderer) = setup();
        store.fail_next_insert("quota");

        let result = sync.send(Draft::new("hi")).await;
        assert!(matches!(result, Err(ClientError::Store(_))));
    }

    #[tokio::test]
    async fn flag_sets_moderation_flag() {
        let (sync, store, _renderer) = setup();
        store.insert_raw(public_at("m1", 1, "spam"));

        sync.flag(&MessageId::new("m1")).await.unwrap();

        assert!(store.get(&MessageId::new("m1")).unwrap().flagged);
        assert!(matches!(
            sync.flag(&MessageId::new("nope")).await,
            Err(ClientError::Store(StoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn delete_own_message_removes_it() {
        let (sync, store, renderer) = setup();
        let stored = sync.send(Draft::new("oops")).await.unwrap();
        sync.poll_for_new_messages().await;

        sync.delete(&stored.id).await.unwrap();

        assert!(store.messages().is_empty());
        assert!(renderer.feed().is_empty());
        assert!(renderer.calls().contains(&RenderCall::Remove(stored.id)));
    }

    /// Store that pauses one armed query after it has read its results.
    #[derive(Clone)]
    struct GatedStore {
        inner: MemoryStore,
        armed: Arc<AtomicBool>,
        reached: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl GatedStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                armed: Arc::new(AtomicBool::new(false)),
                reached: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
            }
        }
    }

    #[async_trait]
    impl MessageStore for GatedStore {
        async fn query(&self, query: &MessageQuery) -> Result<Vec<Message>, StoreError> {
            let result = self.inner.query(query).await;
            if self.armed.swap(false, Ordering::AcqRel) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            result
        }

        async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
            self.inner.insert(message).await
        }

        async fn set_flagged(&self, id: &MessageId, flagged: bool) -> Result<(), StoreError> {
            self.inner.set_flagged(id, flagged).await
        }

        async fn delete(&self, id: &MessageId) -> Result<(), StoreError> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn delete_during_poll_keeps_message_out_of_feed() {
        let inner = MemoryStore::new();
        let store = GatedStore::new(inner.clone());
        let renderer = RecordingRenderer::new();
        let sync = Synchronizer::new(store.clone(), renderer.clone(), bob(), SyncConfig::default());
        let stored = sync.send(Draft::new("regret")).await.unwrap();

        // The poll reads the record, then the delete lands before it applies
        store.armed.store(true, Ordering::Release);
        let (outcome, deleted) = tokio::join!(sync.poll_for_new_messages(), async {
            store.reached.notified().await;
            let deleted = sync.delete(&stored.id).await;
            store.release.notify_one();
            deleted
        });

        deleted.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                public: 0,
                private: 0
            }
        );
        assert!(inner.messages().is_empty());
        assert!(renderer.feed().is_empty());
        assert_eq!(sync.status().await.rendered, 0);
    }

    #[tokio::test]
    async fn delete_of_other_authors_message_refused() {
        let (sync, store, _renderer) = setup();
        store.insert_raw(public_at("m1", 1, "mine, says alice"));
        sync.poll_for_new_messages().await;

        let result = sync.delete(&MessageId::new("m1")).await;

        assert!(matches!(result, Err(ClientError::NotAuthor(_))));
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn unread_counts_while_scrolled_away() {
        let (sync, store, renderer) = setup();
        sync.set_scrolled_away(true).await;

        let alice = Viewer::new(UserId::new("uid-alice"), "Alice", RoleTag::Doctor);
        let new = Draft::new("fresh news").into_new_message(&alice).unwrap();
        store.insert(new).await.unwrap();
        sync.poll_for_new_messages().await;
        assert_eq!(sync.unread().await, 1);

        sync.set_scrolled_away(false).await;
        assert_eq!(sync.unread().await, 0);
        assert_eq!(
            renderer.events().last(),
            Some(&FeedEvent::Unread { count: 0 })
        );
    }

    #[tokio::test]
    async fn jump_to_tagged_highlights_newest() {
        let (sync, store, renderer) = setup();
        assert_eq!(sync.jump_to_tagged().await, None);

        store.insert_raw(public_at("m1", 1, "@bob first"));
        store.insert_raw(public_at("m2", 2, "@bob second"));
        sync.poll_for_new_messages().await;

        assert_eq!(sync.jump_to_tagged().await, Some(MessageId::new("m2")));
        assert_eq!(renderer.highlighted().last(), Some(&MessageId::new("m2")));
    }
}
