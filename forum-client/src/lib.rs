//! # forum-client
//!
//! Polling message synchronizer for forum-sync.
//!
//! This is the library an application uses to keep a rendered forum feed
//! in step with a shared message store.
//!
//! ## Features
//!
//! - **Watermarked polling**: separate public and private watermarks, never
//!   moving backwards, with an overlap window de-duplicated by id
//! - **Re-entrancy guard**: at most one poll cycle in flight
//! - **Store abstraction**: pluggable [`MessageStore`] (SQLite, in-memory)
//! - **Pure state machine**: uses forum-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use forum_client::{MemoryStore, Poller, RecordingRenderer, SyncConfig, Synchronizer};
//!
//! let sync = Arc::new(Synchronizer::new(store, renderer, viewer, SyncConfig::default()));
//! sync.load_initial().await?;
//!
//! let poller = Poller::spawn(Arc::clone(&sync));
//! sync.send(Draft::new("hello @alice")).await?;
//! poller.notify_sent();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod poller;
pub mod render;
pub mod store;
pub mod synchronizer;

pub use config::{ConfigError, SyncConfig};
pub use poller::{Poller, PollerHandle};
pub use render::{RecordingRenderer, RenderCall, Renderer};
pub use store::{MemoryStore, MessageStore, StoreError};
pub use synchronizer::{ClientError, CycleOutcome, FeedStatus, Synchronizer};
