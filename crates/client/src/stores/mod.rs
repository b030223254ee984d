//! Application stores built on the reactive store engine.

pub mod auth;
pub mod cargo;
pub mod socket;

pub use auth::{AuthField, AuthState};
pub use cargo::{CargoField, CargoFilter, CargoState};
pub use socket::{SocketField, SocketState};
