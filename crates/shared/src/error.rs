//! Shared error types.

use thiserror::Error;

/// Why a connection attempt did not reach `connected`.
///
/// Transport-level failures are also reflected in the connection status;
/// this value is what the `connect()` caller for that attempt receives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authorization rejected: {0}")]
    AuthRejected(String),
    #[error("authorization timed out after {0} ms")]
    AuthTimeout(u64),
    #[error("already connecting or connected")]
    AlreadyConnecting,
    #[error("not connected")]
    NotConnected,
    /// Superseded by `disconnect()` or a newer `connect()`.
    #[error("connection attempt cancelled")]
    Cancelled,
}

impl ConnectError {
    /// Failures the reconnect loop may retry. Credential problems are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectError::Transport(_))
    }
}

/// Malformed Engine.IO / Socket.IO frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("unknown packet type '{0}'")]
    UnknownPacket(char),
    #[error("event packet without an event name")]
    MissingEventName,
    #[error("invalid JSON body: {0}")]
    Json(String),
}

/// Failure of a plain HTTP call (health probe).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}
