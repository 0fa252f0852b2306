//! Composing outgoing messages.
//!
//! A [`Draft`] collects what the user typed plus the whisper / reply
//! targets and attachments. Validation happens before anything touches the
//! store: the body must be 1 to [`MAX_BODY_CHARS`] characters after
//! trimming, and at most [`MAX_IMAGES`] images may be attached.

use forum_types::{ImageRef, MessageId, NewMessage, RoleTag, UserId, MAX_BODY_CHARS, MAX_IMAGES};
use thiserror::Error;

use crate::mentions::extract_mentions;

/// The signed-in user the feed is rendered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    /// Account id.
    pub user_id: UserId,
    /// Display name (used for mention matching and as author name).
    pub display_name: String,
    /// Role badge.
    pub role: RoleTag,
}

impl Viewer {
    /// Create a viewer.
    pub fn new(user_id: UserId, display_name: &str, role: RoleTag) -> Self {
        Self {
            user_id,
            display_name: display_name.to_string(),
            role,
        }
    }
}

/// Errors rejecting a draft.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    /// Body is empty after trimming.
    #[error("message must not be empty")]
    Empty,

    /// Body exceeds the character limit.
    #[error("message too long: {chars} characters (limit: {max})")]
    TooLong {
        /// Character count after trimming.
        chars: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Too many images attached.
    #[error("too many images: {count} (limit: {max})")]
    TooManyImages {
        /// Number attached.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A whisper addressed to its own author.
    #[error("cannot whisper to yourself")]
    WhisperToSelf,
}

/// An outgoing message before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    body: String,
    whisper_to: Option<(UserId, String)>,
    reply_to: Option<(MessageId, String)>,
    images: Vec<ImageRef>,
}

impl Draft {
    /// Start a draft with the given text.
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            ..Self::default()
        }
    }

    /// Address the draft privately to `recipient`.
    pub fn whisper_to(mut self, recipient: UserId, recipient_name: &str) -> Self {
        self.whisper_to = Some((recipient, recipient_name.to_string()));
        self
    }

    /// Mark the draft as a reply to `message`, written by `author_name`.
    pub fn reply_to(mut self, message: MessageId, author_name: &str) -> Self {
        self.reply_to = Some((message, author_name.to_string()));
        self
    }

    /// Attach an image.
    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.images.push(image);
        self
    }

    /// Body as typed.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Whether the draft is a whisper.
    pub fn is_whisper(&self) -> bool {
        self.whisper_to.is_some()
    }

    /// Check the draft against the limits.
    pub fn validate(&self, author: &Viewer) -> Result<(), ComposeError> {
        let chars = self.body.trim().chars().count();
        if chars == 0 {
            return Err(ComposeError::Empty);
        }
        if chars > MAX_BODY_CHARS {
            return Err(ComposeError::TooLong {
                chars,
                max: MAX_BODY_CHARS,
            });
        }
        if self.images.len() > MAX_IMAGES {
            return Err(ComposeError::TooManyImages {
                count: self.images.len(),
                max: MAX_IMAGES,
            });
        }
        if let Some((recipient, _)) = &self.whisper_to {
            if *recipient == author.user_id {
                return Err(ComposeError::WhisperToSelf);
            }
        }
        Ok(())
    }

    /// Validate and turn the draft into a store write payload.
    pub fn into_new_message(self, author: &Viewer) -> Result<NewMessage, ComposeError> {
        self.validate(author)?;

        let body = self.body.trim().to_string();
        let mentions = extract_mentions(&body);
        let (recipient_id, recipient_name) = match self.whisper_to {
            Some((id, name)) => (Some(id), Some(name)),
            None => (None, None),
        };
        let (reply_to_id, reply_to_name) = match self.reply_to {
            Some((id, name)) => (Some(id), Some(name)),
            None => (None, None),
        };

        Ok(NewMessage {
            author_id: author.user_id.clone(),
            author_name: author.display_name.clone(),
            author_role: author.role,
            body,
            recipient_id,
            recipient_name,
            reply_to_id,
            reply_to_name,
            mentions,
            images: self.images,
        })
    }
}
