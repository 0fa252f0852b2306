//! Range queries against the message store.
//!
//! Every query is a filter plus a descending `created_at` order plus a limit.
//! That is the whole capability set the synchronizer needs from a store:
//! any document database, search index or polling REST endpoint can answer it.

use serde::{Deserialize, Serialize};

use crate::{Message, Timestamp, UserId};

/// Which message stream a query selects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Non-private messages.
    Public,
    /// Private messages addressed to the given user.
    PrivateTo(UserId),
}

/// A filtered, descending range query.
///
/// Results are ordered by `created_at` descending (newest first) and capped
/// at `limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageQuery {
    /// Stream selector.
    pub visibility: Visibility,
    /// Return messages with `created_at` strictly greater than this.
    pub after: Option<Timestamp>,
    /// Return messages with `created_at` strictly less than this.
    pub before: Option<Timestamp>,
    /// Maximum number of messages to return.
    pub limit: u32,
}

impl MessageQuery {
    /// Newest public messages.
    pub fn public(limit: u32) -> Self {
        Self {
            visibility: Visibility::Public,
            after: None,
            before: None,
            limit,
        }
    }

    /// Newest private messages addressed to `user`.
    pub fn private_to(user: UserId, limit: u32) -> Self {
        Self {
            visibility: Visibility::PrivateTo(user),
            after: None,
            before: None,
            limit,
        }
    }

    /// Set the exclusive lower bound.
    pub fn after(mut self, after: Option<Timestamp>) -> Self {
        self.after = after;
        self
    }

    /// Set the exclusive upper bound.
    pub fn before(mut self, before: Option<Timestamp>) -> Self {
        self.before = before;
        self
    }

    /// Whether the query has a range bound.
    pub fn is_bounded(&self) -> bool {
        self.after.is_some() || self.before.is_some()
    }

    /// Whether `message` satisfies the filter (ignoring the limit).
    ///
    /// A record without a timestamp never satisfies a range bound, but is
    /// returned by unbounded queries so callers can see and skip it.
    pub fn matches(&self, message: &Message) -> bool {
        let stream_ok = match &self.visibility {
            Visibility::Public => !message.is_private,
            Visibility::PrivateTo(user) => message.is_addressed_to(user),
        };
        if !stream_ok {
            return false;
        }

        match message.created_at {
            Some(ts) => {
                self.after.map_or(true, |after| ts > after)
                    && self.before.map_or(true, |before| ts < before)
            }
            None => !self.is_bounded(),
        }
    }
}
