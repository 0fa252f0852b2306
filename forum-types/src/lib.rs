//! # forum-types
//!
//! Shared types for the forum-sync workspace.
//!
//! This crate provides the foundational types used across all forum-sync crates:
//! - [`MessageId`], [`UserId`], [`Timestamp`] - Identity and ordering types
//! - [`Message`], [`NewMessage`] - Stored records and the write payload
//! - [`MessageQuery`] - The filtered, descending range query a store must answer
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod message;
mod query;

pub use error::TypesError;
pub use ids::{MessageId, Timestamp, UserId};
pub use message::{ImageKind, ImageRef, Message, NewMessage, RoleTag, MAX_BODY_CHARS, MAX_IMAGES};
pub use query::{MessageQuery, Visibility};
