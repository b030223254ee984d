//! In-memory transport for driving the connection manager in tests.
//!
//! Every successful `open()` produces a [`MockServer`] that the test picks up
//! with [`MockConnector::accept`] and uses to push events, read what the
//! client sent and simulate closes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, TryRecvError, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::time::Instant;

use gruzreis_shared::ConnectError;

use super::{CloseReason, Connector, OutgoingEvent, TransportEvent, TransportLink};
use crate::ws::connection::ConnectionConfig;

#[derive(Default)]
struct MockState {
    opens: Vec<Instant>,
    fail_next: u32,
    fail_all: bool,
    open_delay: Duration,
}

struct MockInner {
    state: Mutex<MockState>,
    servers_tx: UnboundedSender<MockServer>,
    servers_rx: tokio::sync::Mutex<UnboundedReceiver<MockServer>>,
}

#[derive(Clone)]
pub struct MockConnector {
    inner: Arc<MockInner>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        let (servers_tx, servers_rx) = unbounded();
        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState::default()),
                servers_tx,
                servers_rx: tokio::sync::Mutex::new(servers_rx),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse the next `n` opens with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.state().fail_next = n;
    }

    /// Refuse every open until switched off again.
    pub fn fail_all(&self, fail: bool) {
        self.state().fail_all = fail;
    }

    /// Delay each open by `delay` before it resolves.
    pub fn set_open_delay(&self, delay: Duration) {
        self.state().open_delay = delay;
    }

    pub fn open_calls(&self) -> usize {
        self.state().opens.len()
    }

    /// When each `open()` was called, failed ones included.
    pub fn open_times(&self) -> Vec<Instant> {
        self.state().opens.clone()
    }

    /// Wait for the next successful open. `None` only if the connector is gone.
    pub async fn accept(&self) -> Option<MockServer> {
        self.inner.servers_rx.lock().await.next().await
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _config: &ConnectionConfig) -> Result<TransportLink, ConnectError> {
        let delay = {
            let mut state = self.state();
            state.opens.push(Instant::now());
            state.open_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut state = self.state();
            if state.fail_all {
                return Err(ConnectError::Transport("connection refused".to_string()));
            }
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(ConnectError::Transport("connection refused".to_string()));
            }
        }

        let (outgoing_tx, outgoing_rx) = unbounded();
        let (incoming_tx, incoming_rx) = unbounded();
        let server = MockServer {
            to_client: incoming_tx,
            from_client: outgoing_rx,
            buffered: VecDeque::new(),
            closed: false,
        };
        let _ = self.inner.servers_tx.unbounded_send(server);

        Ok(TransportLink {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}

/// Server end of one mock session.
pub struct MockServer {
    to_client: UnboundedSender<TransportEvent>,
    from_client: UnboundedReceiver<OutgoingEvent>,
    buffered: VecDeque<OutgoingEvent>,
    closed: bool,
}

impl MockServer {
    /// Push an event to the client. Returns `false` if the client side is gone.
    pub fn send(&self, event: &str, payload: Value) -> bool {
        self.to_client
            .unbounded_send(TransportEvent::Message {
                event: event.to_string(),
                payload,
            })
            .is_ok()
    }

    /// Server-initiated disconnect.
    pub fn close(&self) {
        let _ = self
            .to_client
            .unbounded_send(TransportEvent::Closed(CloseReason::ServerDisconnect));
    }

    /// Abrupt network loss.
    pub fn drop_connection(&self) {
        let _ = self
            .to_client
            .unbounded_send(TransportEvent::Closed(CloseReason::ConnectionLost(
                "connection reset".to_string(),
            )));
    }

    /// Next event the client emitted, or `None` once the client closed.
    pub async fn recv(&mut self) -> Option<OutgoingEvent> {
        if let Some(event) = self.buffered.pop_front() {
            return Some(event);
        }
        let next = self.from_client.next().await;
        if next.is_none() {
            self.closed = true;
        }
        next
    }

    /// Whether the client has dropped its sending half. Does not wait.
    pub fn is_closed(&mut self) -> bool {
        while !self.closed {
            match self.from_client.try_recv() {
                Ok(event) => self.buffered.push_back(event),
                Err(TryRecvError::Closed) => self.closed = true,
                Err(TryRecvError::Empty) => break,
            }
        }
        self.closed
    }
}
