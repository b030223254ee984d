//! Cargo list actions and server handlers.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;

use gruzreis_shared::events::{
    CARGO_UPDATED, DELETE_CARGO, GET_CARGOS, NEW_OFFER, PUBLISH, SAVE_CARGO, SET_CARGO,
};
use gruzreis_shared::{Cargo, CargoRef, CargoStatus, NewOffer, NoBody, ServerResponse, TokenRequest};

use crate::store::Store;
use crate::stores::{AuthState, CargoField, CargoFilter, CargoState};
use crate::ws::{ConnectionManager, ListenerId};

const NO_TOKEN: &str = "Токен не найден";
const LOAD_FAILED: &str = "Ошибка загрузки грузов";
const SAVE_FAILED: &str = "Ошибка при сохранении груза";
const DELETE_FAILED: &str = "Ошибка при удалении груза";
const PUBLISH_FAILED: &str = "Ошибка при публикации груза";
const NOT_PUBLISHABLE: &str = "Груз нельзя опубликовать в текущем статусе";

/// Loads and edits the signed-in client's cargos.
///
/// Handlers stay registered on the manager until [`detach`](Self::detach)
/// or a manager `reset()`.
#[derive(Clone)]
pub struct CargoService {
    manager: ConnectionManager,
    auth: Store<AuthState>,
    store: Store<CargoState>,
    listeners: Arc<Mutex<Vec<(&'static str, ListenerId)>>>,
}

impl CargoService {
    pub fn new(manager: ConnectionManager, auth: Store<AuthState>, store: Store<CargoState>) -> Self {
        let service = Self {
            manager,
            auth,
            store,
            listeners: Arc::new(Mutex::new(Vec::new())),
        };
        service.register_handlers();
        service
    }

    pub fn store(&self) -> &Store<CargoState> {
        &self.store
    }

    fn register_handlers(&self) {
        let handlers: [(&'static str, fn(&CargoService, &Value)); 7] = [
            (GET_CARGOS, CargoService::on_cargo_list),
            (SET_CARGO, CargoService::on_cargo_saved),
            (SAVE_CARGO, CargoService::on_cargo_saved),
            (CARGO_UPDATED, CargoService::on_cargo_saved),
            (PUBLISH, CargoService::on_published),
            (DELETE_CARGO, CargoService::on_deleted),
            (NEW_OFFER, CargoService::on_new_offer),
        ];

        let mut ids = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for (event, handler) in handlers {
            let service = self.clone();
            let id = self.manager.on(event, move |payload| handler(&service, payload));
            ids.push((event, id));
        }
    }

    /// Unregister every server handler this service installed.
    pub fn detach(&self) {
        let ids = std::mem::take(&mut *self.listeners.lock().unwrap_or_else(PoisonError::into_inner));
        for (event, id) in ids {
            self.manager.off(event, Some(id));
        }
    }

    // --- Actions ---

    fn token(&self) -> Option<String> {
        self.auth.read(|s| s.token.clone()).filter(|t| !t.is_empty())
    }

    /// Emit `event` with the session token, recording failures in the store.
    fn send<T: Serialize>(&self, event: &str, body: T, failure: &str) -> bool {
        let Some(token) = self.token() else {
            crate::log_warn!("'{}' skipped: no session token", event);
            self.store.dispatch(CargoField::Error(Some(NO_TOKEN.to_string())));
            return false;
        };

        self.store
            .batch_update([CargoField::Loading(true), CargoField::Error(None)]);
        if self.manager.emit(event, TokenRequest::new(token, body)) {
            true
        } else {
            self.store.batch_update([
                CargoField::Loading(false),
                CargoField::Error(Some(failure.to_string())),
            ]);
            false
        }
    }

    pub fn load_cargos(&self) -> bool {
        self.send(GET_CARGOS, NoBody {}, LOAD_FAILED)
    }

    pub fn save_cargo(&self, cargo: &Cargo) -> bool {
        let mut cargo = cargo.clone();
        cargo.touch();
        self.send(SET_CARGO, cargo, SAVE_FAILED)
    }

    /// Removes the cargo locally right away; a failed response reloads.
    pub fn delete_cargo(&self, guid: &str) -> bool {
        let sent = self.send(
            DELETE_CARGO,
            CargoRef {
                guid: guid.to_string(),
            },
            DELETE_FAILED,
        );
        if sent {
            self.update_list(|cargos| {
                let before = cargos.len();
                cargos.retain(|c| c.guid != guid);
                cargos.len() != before
            });
        }
        sent
    }

    /// Only `New` cargos can be published; the local copy moves to
    /// `Waiting` immediately.
    pub fn publish_cargo(&self, guid: &str) -> bool {
        let publishable = self
            .store
            .read(|s| s.find(guid).map(|c| c.status.can_publish()));
        match publishable {
            Some(true) => {}
            Some(false) => {
                self.store
                    .dispatch(CargoField::Error(Some(NOT_PUBLISHABLE.to_string())));
                return false;
            }
            None => {
                crate::log_warn!("publish: unknown cargo {}", guid);
                return false;
            }
        }

        let sent = self.send(
            PUBLISH,
            CargoRef {
                guid: guid.to_string(),
            },
            PUBLISH_FAILED,
        );
        if sent {
            self.update_list(|cargos| set_status(cargos, guid, CargoStatus::Waiting));
        }
        sent
    }

    // --- Filters ---

    pub fn set_status_filter(&self, filter: CargoFilter) {
        self.store.dispatch(CargoField::StatusFilter(filter));
    }

    pub fn set_search_query(&self, query: impl Into<String>) {
        self.store.dispatch(CargoField::SearchQuery(query.into()));
    }

    pub fn clear_filters(&self) {
        self.store.batch_update([
            CargoField::StatusFilter(CargoFilter::All),
            CargoField::SearchQuery(String::new()),
        ]);
    }

    pub fn filtered_cargos(&self) -> Vec<Cargo> {
        self.store.read(CargoState::filtered)
    }

    pub fn archived_cargos(&self) -> Vec<Cargo> {
        self.store.read(CargoState::archived)
    }

    pub fn get_cargo(&self, guid: &str) -> Option<Cargo> {
        self.store.read(|s| s.find(guid).cloned())
    }

    // --- Server handlers ---

    /// Copy-on-write edit of the list under the store lock, so actions and
    /// server pushes never overwrite each other's copy. Dispatches only if
    /// `edit` reports a change.
    fn update_list(&self, edit: impl FnOnce(&mut Vec<Cargo>) -> bool) -> bool {
        self.store.update(|s| {
            let mut cargos = Vec::clone(&s.cargos);
            edit(&mut cargos).then(|| CargoField::Cargos(Arc::new(cargos)))
        })
    }

    fn on_cargo_list(&self, payload: &Value) {
        let response = ServerResponse::<Vec<Cargo>>::from_payload(payload);
        match response.into_result(LOAD_FAILED) {
            Ok(cargos) => {
                let cargos = cargos.unwrap_or_default();
                crate::log_info!("Loaded {} cargos", cargos.len());
                self.store.batch_update([
                    CargoField::Loading(false),
                    CargoField::Cargos(Arc::new(cargos)),
                    CargoField::Error(None),
                ]);
            }
            Err(message) => self.fail(message),
        }
    }

    /// `set_cargo` / `save_cargo` answer with an envelope; `cargo_updated`
    /// pushes the bare cargo.
    fn on_cargo_saved(&self, payload: &Value) {
        let cargo = if payload.get("success").is_some() {
            match ServerResponse::<Cargo>::from_payload(payload).into_result(SAVE_FAILED) {
                Ok(cargo) => cargo,
                Err(message) => return self.fail(message),
            }
        } else {
            match serde_json::from_value::<Cargo>(payload.clone()) {
                Ok(cargo) => Some(cargo),
                Err(e) => {
                    crate::log_warn!("Ignoring malformed cargo push: {}", e);
                    return;
                }
            }
        };

        self.store.dispatch(CargoField::Loading(false));
        match cargo {
            Some(cargo) if !cargo.guid.is_empty() => {
                self.update_list(|cargos| upsert(cargos, cargo));
            }
            _ => {
                self.load_cargos();
            }
        }
    }

    fn on_published(&self, payload: &Value) {
        match ServerResponse::<Value>::from_payload(payload).into_result(PUBLISH_FAILED) {
            Ok(_) => {
                self.store.dispatch(CargoField::Loading(false));
                self.load_cargos();
            }
            Err(message) => {
                self.fail(message);
                self.load_cargos();
            }
        }
    }

    fn on_deleted(&self, payload: &Value) {
        match ServerResponse::<Value>::from_payload(payload).into_result(DELETE_FAILED) {
            Ok(_) => {
                self.store.dispatch(CargoField::Loading(false));
            }
            Err(message) => {
                self.fail(message);
                self.load_cargos();
            }
        }
    }

    fn on_new_offer(&self, payload: &Value) {
        let offer = match serde_json::from_value::<NewOffer>(payload.clone()) {
            Ok(offer) => offer,
            Err(e) => {
                crate::log_warn!("Ignoring malformed offer: {}", e);
                return;
            }
        };
        crate::log_info!("New offer on cargo {}", offer.cargo_id);
        self.update_list(|cargos| match cargos.iter_mut().find(|c| c.guid == offer.cargo_id) {
            Some(cargo) => {
                cargo.invoices.push(offer.offer);
                cargo.status = CargoStatus::HasOrders;
                true
            }
            None => false,
        });
    }

    fn fail(&self, message: String) {
        crate::log_warn!("Cargo request failed: {}", message);
        self.store.batch_update([
            CargoField::Loading(false),
            CargoField::Error(Some(message)),
        ]);
    }
}

fn upsert(cargos: &mut Vec<Cargo>, cargo: Cargo) -> bool {
    match cargos.iter_mut().find(|c| c.guid == cargo.guid) {
        Some(existing) if *existing == cargo => false,
        Some(existing) => {
            *existing = cargo;
            true
        }
        None => {
            cargos.insert(0, cargo);
            true
        }
    }
}

fn set_status(cargos: &mut [Cargo], guid: &str, status: CargoStatus) -> bool {
    match cargos.iter_mut().find(|c| c.guid == guid) {
        Some(cargo) if cargo.status != status => {
            cargo.status = status;
            cargo.touch();
            true
        }
        _ => false,
    }
}
