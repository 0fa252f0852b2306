//! Error types for forum-types.

use thiserror::Error;

/// Errors raised while parsing or building forum types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Role tag string is not one of the known tags
    #[error("unknown role tag: {0}")]
    UnknownRole(String),

    /// Image kind string is not one of the known kinds
    #[error("unknown image kind: {0}")]
    UnknownImageKind(String),

    /// Inline image payload could not be decoded
    #[error("invalid inline image: {0}")]
    InvalidImage(String),
}
