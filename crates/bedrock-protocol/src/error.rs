//! Protocol error types

use thiserror::Error;

/// Errors raised while decoding inbound frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not a valid envelope
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope is valid JSON but lacks a field its purpose requires
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Binary frame that does not carry UTF-8 text
    #[error("Frame is not valid UTF-8")]
    NotUtf8,
}

/// Protocol result type
pub type ProtocolResult<T> = Result<T, ProtocolError>;
