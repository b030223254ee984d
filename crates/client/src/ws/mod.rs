//! The backend connection.
//!
//! ```text
//!   AuthService / CargoService / ConnectionSync
//!                    │  emit / on / watch_status
//!                    ▼
//!          ┌───────────────────┐
//!          │ ConnectionManager │  state machine, handshake, backoff
//!          └───────────────────┘
//!                    │  TransportLink (outgoing / incoming channels)
//!                    ▼
//!          ┌───────────────────┐
//!          │     Connector     │  SocketIoConnector | MockConnector
//!          └───────────────────┘
//! ```

mod connection;
mod manager;
mod registry;
pub mod transport;

pub use connection::{
    ConnectionConfig, ConnectionStatus, Credentials, ReconnectPolicy, StatusChange,
    DEFAULT_AUTH_TIMEOUT, DEFAULT_ENDPOINT,
};
pub use manager::{ConnectionManager, StatusObserverId};
pub use registry::{Listener, ListenerId};
pub use transport::{Connector, SocketIoConnector};
