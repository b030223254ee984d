//! Sign-in over the connection handshake.

use serde_json::Value;

use gruzreis_shared::{AuthSession, ConnectError, ServerResponse, AUTH_EVENT};

use crate::store::Store;
use crate::stores::{AuthField, AuthState};
use crate::ws::{ConnectionConfig, ConnectionManager, Credentials};

const AUTH_FAILED: &str = "authorization failed";

#[derive(Clone)]
pub struct AuthService {
    manager: ConnectionManager,
    store: Store<AuthState>,
}

impl AuthService {
    /// Also listens for handshakes the manager re-runs after a reconnect.
    pub fn new(manager: ConnectionManager, store: Store<AuthState>) -> Self {
        let listener_store = store.clone();
        manager.on(AUTH_EVENT, move |payload| {
            apply_handshake(&listener_store, payload);
        });
        Self { manager, store }
    }

    pub fn store(&self) -> &Store<AuthState> {
        &self.store
    }

    /// Connect with `login`/`password` and install the returned session.
    ///
    /// A session already running is torn down first.
    pub async fn login(
        &self,
        config: ConnectionConfig,
        login: &str,
        password: &str,
    ) -> Result<AuthSession, ConnectError> {
        self.store
            .batch_update([AuthField::IsLoading(true), AuthField::Error(None)]);

        if !self.manager.status().accepts_connect() {
            crate::log_info!("Replacing the running session for a new login");
            self.manager.disconnect();
        }

        let config = config.with_credentials(Credentials::new(login, password));
        let result = self.manager.connect(config).await.and_then(|session| {
            session.ok_or_else(|| ConnectError::AuthRejected(AUTH_FAILED.to_string()))
        });
        match result {
            Ok(session) => {
                crate::log_info!("Signed in as '{}'", session.name);
                self.store
                    .batch_update(AuthState::session_updates(session.clone()));
                Ok(session)
            }
            Err(e) => {
                crate::log_warn!("Sign-in failed: {}", e);
                self.store.batch_update([
                    AuthField::Auth(false),
                    AuthField::IsLoading(false),
                    AuthField::Error(Some(login_error_message(&e))),
                ]);
                Err(e)
            }
        }
    }

    pub fn logout(&self) {
        self.manager.disconnect();
        let mut updates = AuthState::cleared_updates();
        updates.push(AuthField::Error(None));
        self.store.batch_update(updates);
        crate::log_info!("Signed out");
    }

    pub fn token(&self) -> Option<String> {
        self.store.read(|s| s.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.read(|s| s.auth)
    }
}

fn login_error_message(err: &ConnectError) -> String {
    match err {
        ConnectError::AuthRejected(message) => message.clone(),
        other => other.to_string(),
    }
}

fn apply_handshake(store: &Store<AuthState>, payload: &Value) {
    match ServerResponse::<AuthSession>::from_payload(payload).into_data(AUTH_FAILED) {
        Ok(session) => {
            crate::log_info!("Session refreshed after reconnect");
            store.batch_update(AuthState::session_updates(session));
        }
        Err(message) => {
            crate::log_warn!("Re-authorization rejected: {}", message);
            let mut updates = AuthState::cleared_updates();
            updates.push(AuthField::Error(Some(message)));
            store.batch_update(updates);
        }
    }
}
