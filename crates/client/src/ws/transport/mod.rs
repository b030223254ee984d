//! Transport seam between the connection manager and the wire.
//!
//! A [`Connector`] opens one session and hands back a [`TransportLink`]: a
//! sender for outgoing events and a receiver for everything the server
//! pushes. Dropping the sender closes the session. Once the receiver yields
//! [`TransportEvent::Closed`] the link is dead and nothing more arrives.

use async_trait::async_trait;
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use serde_json::Value;

use gruzreis_shared::ConnectError;

use super::connection::ConnectionConfig;

pub mod mock;
mod socketio;

pub use socketio::{socket_url, SocketIoConnector};

/// Event queued for the server.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEvent {
    pub event: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The server ended the session on purpose.
    ServerDisconnect,
    /// Socket error, missed heartbeat or abrupt close.
    ConnectionLost(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message { event: String, payload: Value },
    Closed(CloseReason),
}

pub struct TransportLink {
    pub outgoing: UnboundedSender<OutgoingEvent>,
    pub incoming: UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a session for `config`. Resolves once the server accepted the
    /// namespace connect; the credential handshake is the manager's job.
    async fn open(&self, config: &ConnectionConfig) -> Result<TransportLink, ConnectError>;
}
