//! Connection status as seen by the rest of the application.

use chrono::{DateTime, Utc};

use crate::ws::ConnectionStatus;

crate::store_state! {
    pub struct SocketState => SocketField {
        connection_status: ConnectionStatus => ConnectionStatus,
        is_connected: bool => IsConnected,
        /// When the last `connected` transition happened.
        last_connected: Option<DateTime<Utc>> => LastConnected,
        reconnect_attempts: u32 => ReconnectAttempts,
        last_error: Option<String> => LastError,
    }
}

impl Default for SocketState {
    fn default() -> Self {
        Self {
            connection_status: ConnectionStatus::Disconnected,
            is_connected: false,
            last_connected: None,
            reconnect_attempts: 0,
            last_error: None,
        }
    }
}

impl SocketState {
    pub fn is_reconnecting(&self) -> bool {
        self.connection_status == ConnectionStatus::Reconnecting
    }

    pub fn has_error(&self) -> bool {
        self.connection_status == ConnectionStatus::Error
    }
}
