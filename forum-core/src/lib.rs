//! # forum-core
//!
//! Pure logic for forum-sync (no I/O, instant tests).
//!
//! This crate implements the feed bookkeeping behind the message
//! synchronizer without any store or rendering I/O.
//!
//! ## Design Philosophy
//!
//! [`FeedState`] takes batches of store results as input and produces a
//! list of [`Action`]s (insert this record, highlight that one, emit an
//! event). It never talks to a store or a screen. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same batch → same actions)
//! - Easy reasoning about watermark movement and duplicate suppression
//!
//! The actual I/O is performed by `forum-client`, which issues the queries
//! this crate builds and interprets the actions it returns.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compose;
pub mod feed;
pub mod mentions;
pub mod watermark;

pub use compose::{ComposeError, Draft, Viewer};
pub use feed::{Action, Batch, BatchKind, FeedEvent, FeedSettings, FeedState, Position};
pub use mentions::{extract_mentions, mention_spans, mentions_viewer};
pub use watermark::{Stream, SyncWatermark, Watermark};
