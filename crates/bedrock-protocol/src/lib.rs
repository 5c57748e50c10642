//! Bedrock Protocol - wire types for the game's scripting WebSocket API
//!
//! The game connects to us and speaks JSON envelopes of the form
//! `{header: {version, requestId | eventName, messagePurpose}, body}`.
//! This crate only models the slice of that protocol the gateway needs:
//! command requests, command responses, event subscriptions and events.

mod channel;
mod envelope;
mod error;
mod response;
mod text;

pub use channel::RawChannel;
pub use envelope::{Envelope, Header, MessagePurpose, PROTOCOL_VERSION};
pub use error::{ProtocolError, ProtocolResult};
pub use response::{CommandResponse, STATUS_FAILED, STATUS_OK};
pub use text::{escape_text, is_raw_display, rawtext_command, RAW_DISPLAY_PREFIXES};
