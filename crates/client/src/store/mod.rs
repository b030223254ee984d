//! Fine-grained reactive store.
//!
//! A [`Store`] owns one state value. Writers go through
//! [`dispatch`](Store::dispatch) / [`batch_update`](Store::batch_update);
//! readers register a selector and are called back only when *their* slice
//! changes. Each dispatch costs one selector run per subscriber, independent
//! of how many consumers read unrelated fields.
//!
//! ```rust,ignore
//! let store = Store::new("auth", AuthState::default());
//! let (id, signed_in) = store.subscribe(|s: &AuthState| s.auth, |auth| {
//!     log_info!("auth flag is now {auth}");
//! });
//!
//! store.dispatch(AuthField::Name(Some("Пётр".into()))); // no callback
//! store.dispatch(AuthField::Auth(true));                 // callback(true)
//! store.unsubscribe(id);
//! ```

mod engine;
mod shallow;
mod state;

pub use engine::{Store, SubscriptionId};
pub use shallow::ShallowEq;
pub use state::{DynamicState, DynamicUpdate, StoreState};
