//! Error types shared across the engine

use thiserror::Error;

/// Result alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Request validation errors.
///
/// These are rejected synchronously before any engine call and are never
/// retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("text is required")]
    EmptyText,

    #[error("invalid numeric voice id: {0}")]
    InvalidVoiceId(i64),

    #[error("invalid voice name: {0}")]
    InvalidVoiceName(String),
}

/// Top-level error for the streaming speech engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("transport error: {0}")]
    Transport(String),
}
