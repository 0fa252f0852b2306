//! # forum-store
//!
//! SQLite-backed [`MessageStore`](forum_client::MessageStore) for forum-sync.
//!
//! Timestamps are assigned by the store from a single-row clock table, so
//! they are strictly increasing even when several messages land within the
//! same millisecond or the wall clock steps backwards.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod sqlite;

pub use sqlite::SqliteStore;
