//! Feed state machine for forum-sync.
//!
//! [`FeedState`] owns everything the synchronizer knows about the feed it
//! has rendered: both watermarks, the set of rendered ids, the paging cursor
//! for older messages, tagged messages and the unread counter.
//!
//! It builds the queries to send to the store and turns store results into
//! a list of [`Action`]s. The caller performs the I/O; this module never does.

use forum_types::{Message, MessageId, MessageQuery, Timestamp, UserId};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::compose::Viewer;
use crate::mentions::{extract_mentions, mentions_viewer};
use crate::watermark::{Stream, SyncWatermark};

/// Where a record goes in the feed (newest messages sit at the top).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Above everything rendered so far.
    Top,
    /// Below everything rendered so far.
    Bottom,
}

/// Notifications raised to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A newly rendered message mentions the viewer.
    Tagged {
        /// The message.
        id: MessageId,
        /// Tagged messages now tracked.
        total: usize,
    },
    /// The unread counter changed.
    Unread {
        /// New counter value.
        count: u32,
    },
    /// A private message from someone else arrived.
    WhisperReceived {
        /// The message.
        id: MessageId,
        /// Sender display name.
        from: String,
    },
}

/// Instructions for the caller, in the order they must be carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Render a record.
    Insert {
        /// The record.
        message: Message,
        /// Where it goes.
        position: Position,
    },
    /// Record that an id is now present in the feed.
    MarkRendered(MessageId),
    /// Briefly emphasise a rendered record.
    Highlight(MessageId),
    /// Take a record out of the feed.
    Remove(MessageId),
    /// Empty the feed before a full reload.
    ClearFeed,
    /// A record without a timestamp was dropped.
    SkipMalformed(MessageId),
    /// Raise a notification.
    Emit(FeedEvent),
}

/// What produced a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Incremental poll bounded by the watermark.
    Poll,
    /// Initial load or full refresh.
    Initial,
    /// A page of older public messages.
    Older,
}

/// Store results handed to [`FeedState::apply`].
#[derive(Debug, Clone)]
pub struct Batch {
    /// Stream the records were fetched for.
    pub stream: Stream,
    /// What kind of fetch this was.
    pub kind: BatchKind,
    /// Records in the order the store returned them (newest first).
    pub records: Vec<Message>,
    /// Local time the batch was received.
    pub now: Timestamp,
}

impl Batch {
    /// Create a batch received now.
    pub fn new(stream: Stream, kind: BatchKind, records: Vec<Message>) -> Self {
        Self {
            stream,
            kind,
            records,
            now: Timestamp::now(),
        }
    }

    /// Override the receive time.
    pub fn received_at(mut self, now: Timestamp) -> Self {
        self.now = now;
        self
    }
}

/// Query sizes and windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    /// Limit for incremental public polls.
    pub public_limit: u32,
    /// Limit for incremental private polls.
    pub private_limit: u32,
    /// Public messages fetched by an initial load.
    pub initial_public_limit: u32,
    /// Private messages fetched by an initial load.
    pub initial_private_limit: u32,
    /// Page size when loading older messages.
    pub older_page_limit: u32,
    /// How far below the watermark poll queries start.
    pub overlap_ms: u64,
    /// Polled messages older than this do not count as unread.
    pub unread_window_ms: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            public_limit: 20,
            private_limit: 10,
            initial_public_limit: 20,
            initial_private_limit: 20,
            older_page_limit: 10,
            overlap_ms: 2_000,
            unread_window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone)]
struct RenderedEntry {
    author_id: UserId,
    is_private: bool,
}

/// Feed bookkeeping - NO I/O, just state transitions.
#[derive(Debug, Clone)]
pub struct FeedState {
    viewer: Viewer,
    settings: FeedSettings,
    watermarks: SyncWatermark,
    rendered: HashMap<MessageId, RenderedEntry>,
    /// Ids deleted through this feed; never rendered again, even from a
    /// batch fetched before the delete.
    deleted: HashSet<MessageId>,
    /// Oldest public timestamp loaded; `None` once paging is exhausted.
    oldest_public: Option<Timestamp>,
    /// Tagged message ids, newest first.
    tagged: VecDeque<MessageId>,
    unread: u32,
    scrolled_away: bool,
}

impl FeedState {
    /// Create an empty feed for `viewer`.
    pub fn new(viewer: Viewer, settings: FeedSettings) -> Self {
        Self {
            viewer,
            settings,
            watermarks: SyncWatermark::new(),
            rendered: HashMap::new(),
            deleted: HashSet::new(),
            oldest_public: None,
            tagged: VecDeque::new(),
            unread: 0,
            scrolled_away: false,
        }
    }

    /// The viewer this feed is rendered for.
    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Query sizes and windows in use.
    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    /// Current watermarks.
    pub fn watermarks(&self) -> SyncWatermark {
        self.watermarks
    }

    /// Whether `id` is present in the feed.
    pub fn is_rendered(&self, id: &MessageId) -> bool {
        self.rendered.contains_key(id)
    }

    /// Number of records present in the feed.
    pub fn rendered_count(&self) -> usize {
        self.rendered.len()
    }

    /// Author of a rendered record.
    pub fn author_of(&self, id: &MessageId) -> Option<&UserId> {
        self.rendered.get(id).map(|entry| &entry.author_id)
    }

    /// Tagged message ids, newest first.
    pub fn tagged(&self) -> impl Iterator<Item = &MessageId> {
        self.tagged.iter()
    }

    /// Number of tagged messages.
    pub fn tagged_count(&self) -> usize {
        self.tagged.len()
    }

    /// Unread counter.
    pub fn unread(&self) -> u32 {
        self.unread
    }

    /// Oldest public timestamp loaded, if older pages may remain.
    pub fn oldest_public(&self) -> Option<Timestamp> {
        self.oldest_public
    }

    /// Query for the next incremental poll of `stream`.
    pub fn poll_query(&self, stream: Stream) -> MessageQuery {
        let floor = self
            .watermarks
            .get(stream)
            .query_floor(self.settings.overlap_ms);
        match stream {
            Stream::Public => MessageQuery::public(self.settings.public_limit),
            Stream::Private => {
                MessageQuery::private_to(self.viewer.user_id.clone(), self.settings.private_limit)
            }
        }
        .after(floor)
    }

    /// Query for an initial load of `stream`.
    pub fn initial_query(&self, stream: Stream) -> MessageQuery {
        match stream {
            Stream::Public => MessageQuery::public(self.settings.initial_public_limit),
            Stream::Private => MessageQuery::private_to(
                self.viewer.user_id.clone(),
                self.settings.initial_private_limit,
            ),
        }
    }

    /// Query for the next page of older public messages.
    ///
    /// Returns `None` when nothing has been loaded or paging is exhausted.
    pub fn older_query(&self) -> Option<MessageQuery> {
        self.oldest_public.map(|oldest| {
            MessageQuery::public(self.settings.older_page_limit).before(Some(oldest))
        })
    }

    /// Forget everything ahead of a full reload.
    pub fn reset(&mut self) -> Vec<Action> {
        self.watermarks.reset();
        self.rendered.clear();
        self.oldest_public = None;
        self.tagged.clear();
        self.unread = 0;
        vec![Action::ClearFeed, Action::Emit(FeedEvent::Unread { count: 0 })]
    }

    /// Record whether the viewer has scrolled away from the top of the feed.
    ///
    /// Returning to the top clears the unread counter.
    pub fn set_scrolled_away(&mut self, away: bool) -> Vec<Action> {
        self.scrolled_away = away;
        if !away && self.unread > 0 {
            self.unread = 0;
            return vec![Action::Emit(FeedEvent::Unread { count: 0 })];
        }
        vec![]
    }

    /// Highlight the newest tagged message, if any.
    pub fn jump_to_tagged(&self) -> Option<Action> {
        self.tagged.front().cloned().map(Action::Highlight)
    }

    /// Drop a record from the feed (after it was deleted in the store).
    ///
    /// The id is remembered, so a batch that was read before the delete
    /// cannot bring the record back.
    pub fn forget(&mut self, id: &MessageId) -> Vec<Action> {
        self.deleted.insert(id.clone());
        if self.rendered.remove(id).is_none() {
            return vec![];
        }
        self.tagged.retain(|tagged| tagged != id);
        vec![Action::Remove(id.clone())]
    }

    /// Apply store results and return the actions to carry out.
    ///
    /// - Records without a timestamp are skipped.
    /// - Records already rendered are not inserted again.
    /// - Poll batches are inserted at the top oldest-first, so the newest
    ///   ends up on top; initial public loads and older pages are appended
    ///   newest-first.
    /// - The stream watermark moves to the maximum timestamp in the batch,
    ///   including records that were already rendered. Older pages never
    ///   touch the watermark.
    pub fn apply(&mut self, batch: Batch) -> Vec<Action> {
        let Batch {
            stream,
            kind,
            mut records,
            now,
        } = batch;

        let position = match (kind, stream) {
            (BatchKind::Poll, _) | (BatchKind::Initial, Stream::Private) => {
                // Store order is newest first; render oldest first at the top
                records.reverse();
                Position::Top
            }
            (BatchKind::Initial, Stream::Public) | (BatchKind::Older, _) => Position::Bottom,
        };

        let mut actions = Vec::new();
        let mut newest: Option<Timestamp> = None;
        let mut oldest: Option<Timestamp> = None;
        let mut unread_changed = false;

        for message in records {
            let Some(created_at) = message.created_at else {
                actions.push(Action::SkipMalformed(message.id));
                continue;
            };
            newest = newest.max(Some(created_at));
            oldest = Some(oldest.map_or(created_at, |o| o.min(created_at)));

            if self.rendered.contains_key(&message.id) || self.deleted.contains(&message.id) {
                continue;
            }

            let id = message.id.clone();
            let from_viewer = message.author_id == self.viewer.user_id;
            let tagged = stream == Stream::Public && self.mentions_me(&message);
            let whisper_from = (stream == Stream::Private && !from_viewer)
                .then(|| message.author_name.clone());

            self.rendered.insert(
                id.clone(),
                RenderedEntry {
                    author_id: message.author_id.clone(),
                    is_private: message.is_private,
                },
            );
            actions.push(Action::Insert { message, position });
            actions.push(Action::MarkRendered(id.clone()));

            if tagged {
                match kind {
                    BatchKind::Poll => self.tagged.push_front(id.clone()),
                    BatchKind::Initial | BatchKind::Older => self.tagged.push_back(id.clone()),
                }
                actions.push(Action::Emit(FeedEvent::Tagged {
                    id: id.clone(),
                    total: self.tagged.len(),
                }));
            }

            if kind != BatchKind::Poll {
                continue;
            }

            actions.push(Action::Highlight(id.clone()));

            if let Some(from) = whisper_from {
                actions.push(Action::Emit(FeedEvent::WhisperReceived {
                    id: id.clone(),
                    from,
                }));
            }

            let recent = created_at.millis_until(now) < self.settings.unread_window_ms;
            if stream == Stream::Public && self.scrolled_away && recent {
                self.unread = self.unread.saturating_add(1);
                unread_changed = true;
            }
        }

        if unread_changed {
            actions.push(Action::Emit(FeedEvent::Unread { count: self.unread }));
        }

        match kind {
            BatchKind::Poll => {
                if let Some(newest) = newest {
                    self.watermarks.get_mut(stream).observe(newest);
                }
            }
            BatchKind::Initial => {
                if let Some(newest) = newest {
                    self.watermarks.get_mut(stream).observe(newest);
                }
                if stream == Stream::Public {
                    self.oldest_public = oldest;
                }
            }
            BatchKind::Older => {
                // An empty page means there is nothing older left
                self.oldest_public = oldest;
            }
        }

        actions
    }

    /// Number of private records present in the feed.
    pub fn private_count(&self) -> usize {
        self.rendered.values().filter(|entry| entry.is_private).count()
    }

    fn mentions_me(&self, message: &Message) -> bool {
        if message.mentions.is_empty() {
            mentions_viewer(&extract_mentions(&message.body), &self.viewer)
        } else {
            mentions_viewer(&message.mentions, &self.viewer)
        }
    }
}
