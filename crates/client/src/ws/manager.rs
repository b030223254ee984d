//! The connection manager: one backend session, its lifecycle and the event
//! façade on top of it.
//!
//! # State machine
//!
//! ```text
//! disconnected ──connect()──▶ connecting ──open──▶ connected
//!                                 │      └─open + credentials──▶ authenticating
//!                                 └─open failed──▶ error              │
//! authenticating ──success──▶ connected                               │
//! authenticating ──rejected / timeout──▶ error (transport closed) ◀───┘
//! connected ──remote close──▶ reconnecting (policy on) | disconnected (policy off)
//! reconnecting ──retry ok──▶ connected
//! reconnecting ──attempts exhausted──▶ error
//! any ──disconnect()──▶ disconnected
//! ```
//!
//! Every `connect()` and `disconnect()` bumps a generation counter. Work
//! spawned for an older generation (transport open, handshake wait, backoff
//! timer) notices and drops its result, so a stale handshake response can
//! never move the machine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use gruzreis_shared::{AuthSession, ConnectError, ServerResponse, AUTH_EVENT};

use super::connection::{ConnectionConfig, ConnectionStatus, StatusChange};
use super::registry::{ListenerId, ListenerRegistry};
use super::transport::{
    CloseReason, Connector, OutgoingEvent, SocketIoConnector, TransportEvent, TransportLink,
};
use crate::notify::{self, NotifyQueue};

type ConnectReply = oneshot::Sender<Result<Option<AuthSession>, ConnectError>>;
type StatusObserver = Arc<dyn Fn(&StatusChange) + Send + Sync>;

/// Token returned by [`ConnectionManager::watch_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusObserverId(u64);

struct ActiveLink {
    id: u64,
    outgoing: UnboundedSender<OutgoingEvent>,
    pump: JoinHandle<()>,
}

struct Inner {
    status: ConnectionStatus,
    last_change: StatusChange,
    config: Option<Arc<ConnectionConfig>>,
    generation: u64,
    attempt: u32,
    link: Option<ActiveLink>,
    next_link_id: u64,
    /// Handshake response slot, keyed by the link it was requested on.
    pending_auth: Option<(u64, oneshot::Sender<Value>)>,
    listeners: ListenerRegistry,
    observers: Vec<(StatusObserverId, StatusObserver)>,
    status_streams: Vec<UnboundedSender<StatusChange>>,
    next_observer_id: u64,
    tasks: Vec<JoinHandle<()>>,
    last_error: Option<String>,
}

impl Inner {
    fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_change: StatusChange {
                status: ConnectionStatus::Disconnected,
                attempt: 0,
                error: None,
            },
            config: None,
            generation: 0,
            attempt: 0,
            link: None,
            next_link_id: 0,
            pending_auth: None,
            listeners: ListenerRegistry::default(),
            observers: Vec::new(),
            status_streams: Vec::new(),
            next_observer_id: 0,
            tasks: Vec::new(),
            last_error: None,
        }
    }

    /// Record a transition and queue its observer notifications.
    fn set_status(&mut self, status: ConnectionStatus, error: Option<String>, queue: &NotifyQueue) {
        let change = StatusChange {
            status,
            attempt: self.attempt,
            error,
        };
        if change == self.last_change {
            return;
        }
        if status != self.status {
            crate::log_info!("Connection status: {} -> {}", self.status, status);
        }
        self.status = status;
        self.last_change = change.clone();

        self.status_streams
            .retain(|tx| tx.unbounded_send(change.clone()).is_ok());
        for (_, observer) in &self.observers {
            let observer = observer.clone();
            let change = change.clone();
            queue.push(Box::new(move || observer(&change)));
        }
    }

    fn fail(&mut self, message: String, queue: &NotifyQueue) {
        crate::log_error!("Connection failed: {}", message);
        self.last_error = Some(message.clone());
        self.set_status(ConnectionStatus::Error, Some(message), queue);
    }

    fn link_id(&self) -> Option<u64> {
        self.link.as_ref().map(|link| link.id)
    }

    /// Drop the active transport. Dropping the sender closes the socket.
    fn close_link(&mut self) {
        if let Some(link) = self.link.take() {
            crate::log_debug!("Closing transport #{}", link.id);
            link.pump.abort();
        }
        self.pending_auth = None;
    }

    fn push_task(&mut self, handle: JoinHandle<()>) {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(handle);
    }
}

/// Owns the single backend connection.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Mutex<Inner>>,
    connector: Arc<dyn Connector>,
    queue: &'static NotifyQueue,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
            connector,
            queue: notify::shared(),
        }
    }

    /// Manager backed by the real Socket.IO transport.
    pub fn native() -> Self {
        Self::new(Arc::new(SocketIoConnector::new()))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    // --- Lifecycle ---

    /// Start a session with `config`.
    ///
    /// Resolves once the manager reaches `connected`, with the handshake's
    /// session when credentials were supplied. Only accepted from
    /// `disconnected` or `error`; otherwise fails with
    /// [`ConnectError::AlreadyConnecting`] and leaves the running session
    /// alone.
    pub async fn connect(
        &self,
        config: ConnectionConfig,
    ) -> Result<Option<AuthSession>, ConnectError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut inner = self.lock();
            if !inner.status.accepts_connect() {
                crate::log_warn!("connect() ignored while {}", inner.status);
                return Err(ConnectError::AlreadyConnecting);
            }

            inner.generation += 1;
            inner.attempt = 0;
            inner.last_error = None;
            let generation = inner.generation;
            let config = Arc::new(config);
            inner.config = Some(config.clone());
            crate::log_info!("Connecting to {}{}", config.endpoint, config.path);
            inner.set_status(ConnectionStatus::Connecting, None, &self.queue);

            let attempt = self.clone().run_attempt(generation, config, Some(reply_tx));
            inner.push_task(tokio::spawn(attempt));
        }
        self.queue.drain();

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Cancelled),
        }
    }

    /// Tear down the session. Listeners stay registered.
    ///
    /// Takes effect immediately: pending attempts, timers and handshakes of
    /// the current session are abandoned and their late results ignored.
    pub fn disconnect(&self) {
        {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.attempt = 0;
            inner.close_link();
            for task in inner.tasks.drain(..) {
                task.abort();
            }
            inner.set_status(ConnectionStatus::Disconnected, None, &self.queue);
        }
        self.queue.drain();
    }

    /// Full reset: disconnect and forget listeners and the stored config.
    pub fn reset(&self) {
        self.disconnect();
        let mut inner = self.lock();
        inner.listeners.clear();
        inner.config = None;
        inner.last_error = None;
    }

    fn run_attempt(
        self,
        generation: u64,
        config: Arc<ConnectionConfig>,
        reply: Option<ConnectReply>,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            match self.establish(generation, &config, reply.is_none()).await {
                Ok(session) => {
                    if let Some(reply) = reply {
                        let result = if self.is_current(generation) {
                            Ok(session)
                        } else {
                            Err(ConnectError::Cancelled)
                        };
                        let _ = reply.send(result);
                    }
                }
                Err(err) => self.handle_failure(generation, err, reply),
            }
        })
    }

    /// Open the transport and, if required, run the handshake.
    async fn establish(
        &self,
        generation: u64,
        config: &ConnectionConfig,
        reconnecting: bool,
    ) -> Result<Option<AuthSession>, ConnectError> {
        let link = self.connector.open(config).await?;

        let handshake = {
            let mut inner = self.lock();
            if inner.generation != generation {
                crate::log_debug!("Discarding transport opened for a superseded attempt");
                return Err(ConnectError::Cancelled);
            }

            let TransportLink { outgoing, incoming } = link;
            inner.next_link_id += 1;
            let link_id = inner.next_link_id;
            let pump = tokio::spawn(self.clone().pump(link_id, incoming));
            inner.link = Some(ActiveLink {
                id: link_id,
                outgoing: outgoing.clone(),
                pump,
            });

            match &config.credentials {
                None => {
                    inner.attempt = 0;
                    inner.set_status(ConnectionStatus::Connected, None, &self.queue);
                    None
                }
                Some(credentials) => {
                    let (auth_tx, auth_rx) = oneshot::channel();
                    inner.pending_auth = Some((link_id, auth_tx));
                    inner.set_status(ConnectionStatus::Authenticating, None, &self.queue);

                    crate::log_info!("Sending authorization for '{}'", credentials.login);
                    let payload = match serde_json::to_value(credentials.to_request()) {
                        Ok(payload) => payload,
                        Err(e) => return Err(ConnectError::Transport(e.to_string())),
                    };
                    let _ = outgoing.unbounded_send(OutgoingEvent {
                        event: AUTH_EVENT.to_string(),
                        payload,
                    });
                    Some(auth_rx)
                }
            }
        };
        self.queue.drain();

        let Some(auth_rx) = handshake else {
            return Ok(None);
        };

        let payload = match tokio::time::timeout(config.auth_timeout, auth_rx).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(_)) => {
                // Slot dropped: the link closed or the session was replaced.
                return Err(if self.is_current(generation) {
                    ConnectError::Transport("connection closed during authorization".to_string())
                } else {
                    ConnectError::Cancelled
                });
            }
            Err(_) => {
                return Err(ConnectError::AuthTimeout(
                    config.auth_timeout.as_millis() as u64,
                ))
            }
        };

        let outcome = {
            let mut inner = self.lock();
            if inner.generation != generation {
                crate::log_debug!("Ignoring authorization response for a superseded attempt");
                return Err(ConnectError::Cancelled);
            }

            // A success without a session is no sign-in at all.
            let response = ServerResponse::<AuthSession>::from_payload(&payload);
            let outcome = response.into_data("authorization failed");
            if outcome.is_ok() {
                inner.attempt = 0;
                inner.set_status(ConnectionStatus::Connected, None, &self.queue);
            }
            // Nobody awaits a reconnection handshake; its listeners do.
            if reconnecting {
                let payload = Arc::new(payload);
                for listener in inner.listeners.listeners(AUTH_EVENT) {
                    let payload = payload.clone();
                    self.queue.push(Box::new(move || listener(&payload)));
                }
            }
            outcome
        };
        self.queue.drain();

        match outcome {
            Ok(session) => {
                crate::log_info!("Authorization succeeded");
                Ok(Some(session))
            }
            Err(message) => Err(ConnectError::AuthRejected(message)),
        }
    }

    fn handle_failure(&self, generation: u64, err: ConnectError, reply: Option<ConnectReply>) {
        {
            let mut inner = self.lock();
            if inner.generation != generation || err == ConnectError::Cancelled {
                crate::log_debug!("Attempt abandoned: {}", err);
                drop(inner);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(ConnectError::Cancelled));
                }
                return;
            }

            inner.close_link();
            if reply.is_none() && err.is_retryable() {
                crate::log_warn!("Reconnect attempt {} failed: {}", inner.attempt, err);
                self.schedule_reconnect(&mut inner);
            } else {
                inner.fail(err.to_string(), &self.queue);
            }
        }
        self.queue.drain();

        if let Some(reply) = reply {
            let _ = reply.send(Err(err));
        }
    }

    /// Move to `reconnecting` and arm the backoff timer, or give up.
    fn schedule_reconnect(&self, inner: &mut Inner) {
        let Some(config) = inner.config.clone() else {
            inner.set_status(ConnectionStatus::Disconnected, None, &self.queue);
            return;
        };
        let policy = config.reconnect;

        inner.attempt += 1;
        if inner.attempt > policy.max_attempts {
            let message = format!(
                "gave up reconnecting after {} attempts",
                policy.max_attempts
            );
            inner.fail(message, &self.queue);
            return;
        }

        let attempt = inner.attempt;
        let delay = policy.delay_for_attempt(attempt);
        crate::log_info!(
            "Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            attempt,
            policy.max_attempts
        );
        inner.set_status(ConnectionStatus::Reconnecting, None, &self.queue);

        let generation = inner.generation;
        let manager = self.clone();
        inner.push_task(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !manager.is_current(generation) {
                crate::log_debug!("Dropping stale reconnect timer");
                return;
            }
            manager.run_attempt(generation, config, None).await;
        }));
    }

    // --- Transport events ---

    async fn pump(self, link_id: u64, mut incoming: UnboundedReceiver<TransportEvent>) {
        while let Some(event) = incoming.next().await {
            match event {
                TransportEvent::Message { event, payload } => {
                    self.on_message(link_id, event, payload)
                }
                TransportEvent::Closed(reason) => {
                    self.on_closed(link_id, reason);
                    return;
                }
            }
        }
        self.on_closed(
            link_id,
            CloseReason::ConnectionLost("transport ended".to_string()),
        );
    }

    fn on_message(&self, link_id: u64, event: String, payload: Value) {
        {
            let mut inner = self.lock();
            if inner.link_id() != Some(link_id) {
                crate::log_debug!("Dropping '{}' from a closed transport", event);
                return;
            }

            if event == AUTH_EVENT
                && matches!(&inner.pending_auth, Some((pending, _)) if *pending == link_id)
            {
                if let Some((_, slot)) = inner.pending_auth.take() {
                    let _ = slot.send(payload);
                }
                return;
            }

            let listeners = inner.listeners.listeners(&event);
            if listeners.is_empty() {
                crate::log_debug!("No listeners for '{}'", event);
            }
            let payload = Arc::new(payload);
            for listener in listeners {
                let payload = payload.clone();
                self.queue.push(Box::new(move || listener(&payload)));
            }
        }
        self.queue.drain();
    }

    fn on_closed(&self, link_id: u64, reason: CloseReason) {
        {
            let mut inner = self.lock();
            if inner.link_id() != Some(link_id) {
                return;
            }
            crate::log_warn!("Transport #{} closed: {:?}", link_id, reason);
            inner.close_link();

            // Closes while connecting or authenticating surface through the
            // dropped handshake slot; only a live session reacts here.
            if inner.status == ConnectionStatus::Connected {
                let reconnect = inner
                    .config
                    .as_ref()
                    .map(|c| c.reconnect.enabled)
                    .unwrap_or(false);
                if reconnect {
                    self.schedule_reconnect(&mut inner);
                } else {
                    inner.set_status(ConnectionStatus::Disconnected, None, &self.queue);
                }
            }
        }
        self.queue.drain();
    }

    // --- Event façade ---

    /// Send `event` now. Fails with [`ConnectError::NotConnected`] unless
    /// the manager is `connected`; nothing is queued for later.
    pub fn try_emit(&self, event: &str, payload: impl Serialize) -> Result<(), ConnectError> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| ConnectError::Transport(format!("cannot serialize '{}': {}", event, e)))?;

        let inner = self.lock();
        if !inner.status.is_connected() {
            crate::log_warn!("Cannot emit '{}' while {}", event, inner.status);
            return Err(ConnectError::NotConnected);
        }
        let link = inner.link.as_ref().ok_or(ConnectError::NotConnected)?;
        link.outgoing
            .unbounded_send(OutgoingEvent {
                event: event.to_string(),
                payload,
            })
            .map_err(|_| ConnectError::NotConnected)
    }

    /// [`try_emit`](Self::try_emit) reduced to success/failure.
    pub fn emit(&self, event: &str, payload: impl Serialize) -> bool {
        match self.try_emit(event, payload) {
            Ok(()) => true,
            Err(e) => {
                crate::log_debug!("emit '{}' failed: {}", event, e);
                false
            }
        }
    }

    /// Register a listener for `event`. Survives reconnects and `disconnect()`.
    pub fn on(&self, event: &str, listener: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        self.lock().listeners.add(event, Arc::new(listener))
    }

    /// Remove one listener, or every listener for `event` when `id` is `None`.
    /// Returns how many were removed.
    pub fn off(&self, event: &str, id: Option<ListenerId>) -> usize {
        let mut inner = self.lock();
        match id {
            Some(id) => usize::from(inner.listeners.remove(event, id)),
            None => inner.listeners.remove_all(event),
        }
    }

    /// Stream flavour of [`on`](Self::on). Pass the id to `off` when done.
    pub fn events(&self, event: &str) -> (ListenerId, UnboundedReceiver<Value>) {
        let (tx, rx) = unbounded();
        let id = self.on(event, move |payload| {
            let _ = tx.unbounded_send(payload.clone());
        });
        (id, rx)
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    // --- Status ---

    pub fn status(&self) -> ConnectionStatus {
        self.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Called on every transition, before event listeners queued after it.
    pub fn watch_status(
        &self,
        observer: impl Fn(&StatusChange) + Send + Sync + 'static,
    ) -> StatusObserverId {
        let mut inner = self.lock();
        inner.next_observer_id += 1;
        let id = StatusObserverId(inner.next_observer_id);
        inner.observers.push((id, Arc::new(observer)));
        id
    }

    pub fn unwatch_status(&self, id: StatusObserverId) -> bool {
        let mut inner = self.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(oid, _)| *oid != id);
        inner.observers.len() != before
    }

    /// Every transition from now on, as a stream. Dropping the receiver
    /// unregisters it.
    pub fn status_changes(&self) -> UnboundedReceiver<StatusChange> {
        let (tx, rx) = unbounded();
        self.lock().status_streams.push(tx);
        rx
    }
}
