//! Gateway error types

use bedrock_protocol::ProtocolError;

/// Errors that stop the listener or a single connection task
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}

/// Faults scoped to one session or one command
///
/// These are only ever logged. Consumers see their effects through
/// `disconnect`/`leave` events and `statusCode: -1` responses.
#[derive(Debug, thiserror::Error)]
pub enum SessionFault {
    #[error("transport fault: {0}")]
    Transport(String),
    #[error("protocol parse fault: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("command timed out: {command}")]
    CommandTimeout { command: String },
    #[error("subscription to {channel} failed ({status_code}): {status_message}")]
    Subscription {
        channel: String,
        status_code: i64,
        status_message: String,
    },
    #[error("no pending command for response {request_id}")]
    UnmatchedResponse { request_id: String },
}
