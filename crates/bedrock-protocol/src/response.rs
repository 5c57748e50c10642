//! Command responses
//!
//! The game answers every correlated request with a body carrying at least a
//! `statusCode`. Synthetic responses produced locally (timeouts, closed
//! transport) use the same shape so callers only ever see one type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status code of a successful command
pub const STATUS_OK: i64 = 0;

/// Status code of every locally synthesized failure
pub const STATUS_FAILED: i64 = -1;

/// Result of a command or subscribe request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    #[serde(default = "missing_status")]
    pub status_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Command-specific fields (`players`, `localplayername`, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn missing_status() -> i64 {
    STATUS_FAILED
}

impl CommandResponse {
    fn synthetic(status_code: i64, status_message: Option<&str>) -> Self {
        Self {
            status_code,
            status_message: status_message.map(str::to_string),
            fields: Map::new(),
        }
    }

    /// Immediate success, used for requests the game never answers
    pub fn ok() -> Self {
        Self::synthetic(STATUS_OK, None)
    }

    /// The deadline passed before a response arrived
    pub fn timeout() -> Self {
        Self::synthetic(STATUS_FAILED, Some("Timeout"))
    }

    /// The transport was not open when the request was made
    pub fn not_connected() -> Self {
        Self::synthetic(STATUS_FAILED, None)
    }

    /// The transport closed while the request was outstanding
    pub fn closed() -> Self {
        Self::synthetic(STATUS_FAILED, Some("Connection closed"))
    }

    /// Interpret a response body; bodies that are not objects become failures
    pub fn from_body(body: Value) -> Self {
        serde_json::from_value(body)
            .unwrap_or_else(|_| Self::synthetic(STATUS_FAILED, Some("Malformed response")))
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }

    /// Raw access to a command-specific field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Command-specific string field
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Names reported by the `list` command, in the order the game sent them
    pub fn player_names(&self) -> Vec<String> {
        self.str_field("players")
            .map(|players| {
                players
                    .split(", ")
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
