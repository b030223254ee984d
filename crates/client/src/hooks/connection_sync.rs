//! Mirrors manager status into the socket store.

use chrono::Utc;

use crate::store::Store;
use crate::stores::{SocketField, SocketState};
use crate::ws::{ConnectionManager, StatusChange, StatusObserverId};

pub struct ConnectionSync {
    manager: ConnectionManager,
    observer: StatusObserverId,
}

impl ConnectionSync {
    /// Seed `store` with the current status and keep it in step, one batch
    /// per transition.
    pub fn attach(manager: &ConnectionManager, store: Store<SocketState>) -> Self {
        store.batch_update(updates_for(&StatusChange {
            status: manager.status(),
            attempt: 0,
            error: manager.last_error(),
        }));

        let observer = manager.watch_status(move |change| {
            store.batch_update(updates_for(change));
        });
        Self {
            manager: manager.clone(),
            observer,
        }
    }

    /// Stop mirroring. Returns `false` if already detached.
    pub fn detach(&self) -> bool {
        self.manager.unwatch_status(self.observer)
    }
}

fn updates_for(change: &StatusChange) -> Vec<SocketField> {
    let connected = change.status.is_connected();
    let mut updates = vec![
        SocketField::ConnectionStatus(change.status),
        SocketField::IsConnected(connected),
        SocketField::ReconnectAttempts(change.attempt),
    ];
    if connected {
        updates.push(SocketField::LastConnected(Some(Utc::now())));
        updates.push(SocketField::LastError(None));
    }
    if let Some(error) = &change.error {
        updates.push(SocketField::LastError(Some(error.clone())));
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::ConnectionStatus;

    #[test]
    fn connected_transition_stamps_time_and_clears_error() {
        let store = Store::new("socket", SocketState::default());
        store.dispatch(SocketField::LastError(Some("boom".into())));

        store.batch_update(updates_for(&StatusChange {
            status: ConnectionStatus::Connected,
            attempt: 0,
            error: None,
        }));
        let state = store.get_state();
        assert!(state.is_connected);
        assert!(state.last_connected.is_some());
        assert_eq!(state.last_error, None);
    }

    #[test]
    fn reconnecting_records_attempt() {
        let store = Store::new("socket", SocketState::default());
        store.batch_update(updates_for(&StatusChange {
            status: ConnectionStatus::Reconnecting,
            attempt: 3,
            error: None,
        }));
        let state = store.get_state();
        assert!(state.is_reconnecting());
        assert_eq!(state.reconnect_attempts, 3);
        assert!(!state.is_connected);
    }
}
