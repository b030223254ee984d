//! Gruzreis client connectivity core.
//!
//! A single Socket.IO session to the gruzreis backend managed as an explicit
//! state machine ([`ws::ConnectionManager`]), a fine-grained reactive store
//! ([`store::Store`]) and the domain hooks that connect the two.

pub mod logging;

mod notify;

pub mod context;
pub mod health;
pub mod hooks;
pub mod store;
pub mod stores;
pub mod ws;

pub use context::AppContext;
pub use store::{Store, SubscriptionId};
pub use ws::{ConnectionConfig, ConnectionManager, ConnectionStatus};
