//! Shared types for the gruzreis client: wire protocol, payload models and errors.

pub mod models;
pub mod protocol;
pub mod error;

pub use models::*;
pub use protocol::*;
pub use error::*;
