//! Application wiring: one manager, its stores and the services on top.

use std::sync::Arc;

use crate::hooks::{AuthService, CargoService, ConnectionSync};
use crate::store::Store;
use crate::stores::{AuthState, CargoState, SocketState};
use crate::ws::{ConnectionManager, Connector, SocketIoConnector};

/// Built once at startup and cloned into whatever needs it.
#[derive(Clone)]
pub struct AppContext {
    pub manager: ConnectionManager,
    pub socket: Store<SocketState>,
    pub auth_state: Store<AuthState>,
    pub cargo_state: Store<CargoState>,
    pub auth: AuthService,
    pub cargos: CargoService,
    sync: Arc<ConnectionSync>,
}

impl AppContext {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let manager = ConnectionManager::new(connector);
        let socket = Store::new("socket", SocketState::default());
        let auth_state = Store::new("auth", AuthState::default());
        let cargo_state = Store::new("cargo", CargoState::default());

        let sync = Arc::new(ConnectionSync::attach(&manager, socket.clone()));
        let auth = AuthService::new(manager.clone(), auth_state.clone());
        let cargos = CargoService::new(manager.clone(), auth_state.clone(), cargo_state.clone());

        Self {
            manager,
            socket,
            auth_state,
            cargo_state,
            auth,
            cargos,
            sync,
        }
    }

    pub fn native() -> Self {
        Self::new(Arc::new(SocketIoConnector::new()))
    }

    /// Disconnect and drop every listener, including the services' own.
    pub fn shutdown(&self) {
        self.manager.reset();
        self.sync.detach();
    }
}
