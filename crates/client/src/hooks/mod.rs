//! Domain hooks: glue between the connection manager and the stores.
//!
//! Each hook owns no state of its own. Reads go through the stores, actions
//! go out through [`ConnectionManager::emit`](crate::ws::ConnectionManager::emit)
//! and server responses come back through listeners that write the stores.

pub mod auth;
pub mod cargos;
pub mod connection_sync;

pub use auth::AuthService;
pub use cargos::CargoService;
pub use connection_sync::ConnectionSync;
