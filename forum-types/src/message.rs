//! Forum message records.
//!
//! A [`Message`] is what the store hands back; a [`NewMessage`] is what a
//! client writes. The store assigns the id and the creation timestamp.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{MessageId, Timestamp, TypesError, UserId};

/// Maximum message body length, in characters.
pub const MAX_BODY_CHARS: usize = 500;

/// Maximum number of images attached to one message.
pub const MAX_IMAGES: usize = 4;

/// Role badge shown next to an author's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleTag {
    /// Medical professional
    Doctor,
    /// Student
    Student,
    /// Health enthusiast
    Enthusiast,
    /// Everyone else
    #[default]
    User,
}

impl RoleTag {
    /// Lowercase tag as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleTag::Doctor => "doctor",
            RoleTag::Student => "student",
            RoleTag::Enthusiast => "enthusiast",
            RoleTag::User => "user",
        }
    }

    /// Parse a stored tag, falling back to [`RoleTag::User`] for anything unknown.
    pub fn parse_lossy(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for RoleTag {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doctor" => Ok(RoleTag::Doctor),
            "student" => Ok(RoleTag::Student),
            "enthusiast" => Ok(RoleTag::Enthusiast),
            "user" => Ok(RoleTag::User),
            _ => Err(TypesError::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an attached image lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// Uploaded to an image host; `url` is the public URL.
    Hosted,
    /// Embedded in the record as a base64 data URL.
    Inline,
}

impl ImageKind {
    /// Lowercase kind as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Hosted => "hosted",
            ImageKind::Inline => "inline",
        }
    }
}

impl FromStr for ImageKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hosted" => Ok(ImageKind::Hosted),
            "inline" => Ok(ImageKind::Inline),
            _ => Err(TypesError::UnknownImageKind(s.to_string())),
        }
    }
}

/// Reference to an image attached to a message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Hosted URL or inline data URL.
    pub kind: ImageKind,
    /// The URL (for inline images, a `data:` URL).
    pub url: String,
}

impl ImageRef {
    /// Reference an image already uploaded to a host.
    pub fn hosted(url: impl Into<String>) -> Self {
        Self {
            kind: ImageKind::Hosted,
            url: url.into(),
        }
    }

    /// Embed raw image bytes as a base64 data URL.
    pub fn inline(mime: &str, bytes: &[u8]) -> Self {
        Self {
            kind: ImageKind::Inline,
            url: format!("data:{};base64,{}", mime, STANDARD.encode(bytes)),
        }
    }

    /// Decode the bytes of an inline image.
    ///
    /// Returns an error for hosted images and for malformed data URLs.
    pub fn inline_bytes(&self) -> Result<Vec<u8>, TypesError> {
        if self.kind != ImageKind::Inline {
            return Err(TypesError::InvalidImage("not an inline image".into()));
        }
        let (_, encoded) = self
            .url
            .split_once(";base64,")
            .ok_or_else(|| TypesError::InvalidImage("missing base64 marker".into()))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| TypesError::InvalidImage(e.to_string()))
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = match self.kind {
            ImageKind::Hosted => self.url.clone(),
            ImageKind::Inline => format!("[inline data URL, {} chars]", self.url.len()),
        };
        f.debug_struct("ImageRef")
            .field("kind", &self.kind)
            .field("url", &url)
            .finish()
    }
}

/// A message as returned by the store.
///
/// Immutable once created except for the `flagged` moderation flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier.
    pub id: MessageId,
    /// Author account id.
    pub author_id: UserId,
    /// Author display name at send time.
    pub author_name: String,
    /// Author role badge at send time.
    pub author_role: RoleTag,
    /// Message text (at most [`MAX_BODY_CHARS`] characters).
    pub body: String,
    /// Server-assigned creation time. `None` marks an incomplete record.
    pub created_at: Option<Timestamp>,
    /// Whether this is a private message (whisper).
    pub is_private: bool,
    /// Recipient of a private message.
    pub recipient_id: Option<UserId>,
    /// Recipient display name of a private message.
    pub recipient_name: Option<String>,
    /// Message this one replies to.
    pub reply_to_id: Option<MessageId>,
    /// Author name of the message replied to.
    pub reply_to_name: Option<String>,
    /// Mention tokens extracted from the body at send time.
    #[serde(default)]
    pub mentions: Vec<String>,
    /// Attached images, in order (at most [`MAX_IMAGES`]).
    #[serde(default)]
    pub images: Vec<ImageRef>,
    /// Moderation flag, settable by any reader.
    #[serde(default)]
    pub flagged: bool,
}

impl Message {
    /// Materialize a stored record from a write payload.
    ///
    /// Used by store implementations once they have assigned the id and timestamp.
    pub fn from_new(id: MessageId, created_at: Timestamp, new: NewMessage) -> Self {
        let is_private = new.is_private();
        Self {
            id,
            author_id: new.author_id,
            author_name: new.author_name,
            author_role: new.author_role,
            body: new.body,
            created_at: Some(created_at),
            is_private,
            recipient_id: new.recipient_id,
            recipient_name: new.recipient_name,
            reply_to_id: new.reply_to_id,
            reply_to_name: new.reply_to_name,
            mentions: new.mentions,
            images: new.images,
            flagged: false,
        }
    }

    /// Whether this is a private message addressed to `user`.
    pub fn is_addressed_to(&self, user: &UserId) -> bool {
        self.is_private && self.recipient_id.as_ref() == Some(user)
    }
}

/// Payload for appending a message to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Author account id.
    pub author_id: UserId,
    /// Author display name.
    pub author_name: String,
    /// Author role badge.
    pub author_role: RoleTag,
    /// Message text.
    pub body: String,
    /// Recipient for a private message; `None` for a public one.
    pub recipient_id: Option<UserId>,
    /// Recipient display name for a private message.
    pub recipient_name: Option<String>,
    /// Message this one replies to.
    pub reply_to_id: Option<MessageId>,
    /// Author name of the message replied to.
    pub reply_to_name: Option<String>,
    /// Mention tokens extracted from the body.
    pub mentions: Vec<String>,
    /// Attached images.
    pub images: Vec<ImageRef>,
}

impl NewMessage {
    /// A message with a recipient is private.
    pub fn is_private(&self) -> bool {
        self.recipient_id.is_some()
    }
}
