//! Envelope framing
//!
//! Every frame, in both directions, is a single JSON document with a
//! `header` describing its purpose and a purpose-specific `body`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ProtocolError, ProtocolResult};

/// Envelope version we emit and expect
pub const PROTOCOL_VERSION: u32 = 1;

const COMMAND_REQUEST_TYPE: &str = "commandRequest";

/// What a frame is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessagePurpose {
    /// Outbound command
    CommandRequest,
    /// Reply to a command or subscribe request
    CommandResponse,
    /// Unsolicited event on a subscribed channel
    Event,
    /// Outbound channel subscription
    Subscribe,
    /// Failed request, correlated like a response
    Error,
    /// Anything else the game may send
    #[serde(other)]
    Unknown,
}

/// Frame header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    pub message_purpose: MessagePurpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

/// A complete frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub header: Header,
    #[serde(default)]
    pub body: Value,
}

impl Envelope {
    /// Build a command request as issued by a player origin
    pub fn command_request(request_id: impl Into<String>, command_line: &str) -> Self {
        Self {
            header: Header {
                version: PROTOCOL_VERSION,
                request_id: Some(request_id.into()),
                event_name: None,
                message_purpose: MessagePurpose::CommandRequest,
                message_type: Some(COMMAND_REQUEST_TYPE.to_string()),
            },
            body: json!({
                "origin": { "type": "player" },
                "commandLine": command_line,
                "version": PROTOCOL_VERSION,
            }),
        }
    }

    /// Build a subscribe request for a raw channel
    pub fn subscribe(request_id: impl Into<String>, event_name: &str) -> Self {
        Self {
            header: Header {
                version: PROTOCOL_VERSION,
                request_id: Some(request_id.into()),
                event_name: None,
                message_purpose: MessagePurpose::Subscribe,
                message_type: Some(COMMAND_REQUEST_TYPE.to_string()),
            },
            body: json!({ "eventName": event_name }),
        }
    }

    /// Parse a text frame
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a binary frame carrying UTF-8 JSON
    pub fn decode_bytes(bytes: &[u8]) -> ProtocolResult<Self> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        Self::decode(text)
    }

    /// Serialize for the wire
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Correlation id, required for responses
    pub fn request_id(&self) -> ProtocolResult<&str> {
        self.header
            .request_id
            .as_deref()
            .ok_or(ProtocolError::MissingField("requestId"))
    }

    /// Channel name, required for events
    pub fn event_name(&self) -> ProtocolResult<&str> {
        self.header
            .event_name
            .as_deref()
            .ok_or(ProtocolError::MissingField("eventName"))
    }
}
