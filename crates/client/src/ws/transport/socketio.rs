//! Native Socket.IO transport using tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;
use url::Url;

use gruzreis_shared::{ConnectError, OpenInfo, Packet, ENGINE_IO_VERSION};

use super::{CloseReason, Connector, OutgoingEvent, TransportEvent, TransportLink};
use crate::ws::connection::ConnectionConfig;

/// Upgrade plus Engine.IO/Socket.IO open, matching the server-side default.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Used when the server's open packet carries no heartbeat settings.
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(45);

/// Turn an `http(s)`/`ws(s)` endpoint into the Socket.IO WebSocket URL.
pub fn socket_url(endpoint: &str, path: &str) -> Result<Url, String> {
    let mut url =
        Url::parse(endpoint).map_err(|e| format!("invalid endpoint '{}': {}", endpoint, e))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(format!("unsupported endpoint scheme '{}'", other)),
    };
    url.set_scheme(scheme)
        .map_err(|_| format!("cannot use scheme '{}' for '{}'", scheme, endpoint))?;
    url.set_path(path);
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket");
    Ok(url)
}

/// Opens real WebSocket sessions against the backend.
#[derive(Debug, Clone, Default)]
pub struct SocketIoConnector;

impl SocketIoConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SocketIoConnector {
    async fn open(&self, config: &ConnectionConfig) -> Result<TransportLink, ConnectError> {
        let url = socket_url(&config.endpoint, &config.path).map_err(ConnectError::Transport)?;
        crate::log_info!("Opening socket to {}", url);

        let token = config.token.clone();
        let opened = tokio::time::timeout(CONNECT_TIMEOUT, async move {
            let (mut ws, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| ConnectError::Transport(e.to_string()))?;
            let info = open_session(&mut ws, token.as_deref()).await?;
            Ok::<_, ConnectError>((ws, info))
        })
        .await;

        let (ws, info) = match opened {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectError::Transport(format!(
                    "connect timed out after {} ms",
                    CONNECT_TIMEOUT.as_millis()
                )))
            }
        };
        crate::log_info!("Socket session {} established", info.sid);

        let heartbeat = if info.ping_interval == 0 {
            DEFAULT_HEARTBEAT
        } else {
            Duration::from_millis(info.ping_interval + info.ping_timeout)
        };

        let (outgoing_tx, outgoing_rx) = unbounded();
        let (incoming_tx, incoming_rx) = unbounded();
        let (pong_tx, pong_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let (write, read) = ws.split();

        tokio::spawn(read_loop(read, incoming_tx, pong_tx, heartbeat));
        tokio::spawn(write_loop(write, outgoing_rx, pong_rx));

        Ok(TransportLink {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}

/// Engine.IO open, then namespace connect with the bearer token.
async fn open_session<S>(ws: &mut S, token: Option<&str>) -> Result<OpenInfo, ConnectError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let info = loop {
        match next_packet(ws).await? {
            Packet::Open(info) => break info,
            other => crate::log_debug!("Ignoring {:?} before open", other),
        }
    };

    let auth = token.map(|t| json!({ "token": t }));
    send_packet(ws, &Packet::Connect(auth)).await?;

    loop {
        match next_packet(ws).await? {
            Packet::Connect(_) => return Ok(info),
            Packet::ConnectError(body) => {
                let message = body
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_owned)
                    .unwrap_or_else(|| body.to_string());
                return Err(ConnectError::AuthRejected(message));
            }
            Packet::Ping => send_packet(ws, &Packet::Pong).await?,
            other => crate::log_debug!("Ignoring {:?} before namespace connect", other),
        }
    }
}

async fn next_packet<S>(ws: &mut S) -> Result<Packet, ConnectError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => match Packet::decode(text.as_str()) {
                Ok(packet) => return Ok(packet),
                Err(e) => crate::log_warn!("Skipping malformed frame: {}", e),
            },
            Some(Ok(Message::Close(_))) | None => {
                return Err(ConnectError::Transport(
                    "socket closed during open".to_string(),
                ))
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ConnectError::Transport(e.to_string())),
        }
    }
}

async fn send_packet<S>(ws: &mut S, packet: &Packet) -> Result<(), ConnectError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    ws.send(Message::text(packet.encode()))
        .await
        .map_err(|e| ConnectError::Transport(e.to_string()))
}

async fn read_loop<S>(
    mut read: S,
    incoming: UnboundedSender<TransportEvent>,
    pong: tokio::sync::mpsc::UnboundedSender<()>,
    heartbeat: Duration,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let reason = loop {
        let msg = match tokio::time::timeout(heartbeat, read.next()).await {
            Err(_) => break CloseReason::ConnectionLost("ping timeout".to_string()),
            Ok(None) => break CloseReason::ConnectionLost("stream ended".to_string()),
            Ok(Some(Err(e))) => {
                crate::log_error!("WebSocket read error: {}", e);
                break CloseReason::ConnectionLost(e.to_string());
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => match Packet::decode(text.as_str()) {
                Ok(Packet::Event { event, payload }) => {
                    crate::log_debug!("Received event '{}'", event);
                    let _ = incoming.unbounded_send(TransportEvent::Message { event, payload });
                }
                Ok(Packet::Ping) => {
                    let _ = pong.send(());
                }
                Ok(Packet::Disconnect) | Ok(Packet::Close) => {
                    break CloseReason::ServerDisconnect;
                }
                Ok(other) => crate::log_debug!("Ignoring packet {:?}", other),
                Err(e) => crate::log_warn!("Skipping malformed frame: {}", e),
            },
            Message::Close(frame) => {
                crate::log_info!("WebSocket received close frame: {:?}", frame);
                break CloseReason::ConnectionLost("close frame".to_string());
            }
            _ => {
                // Binary and transport-level ping/pong are not used.
            }
        }
    };

    crate::log_info!("Socket closed: {:?}", reason);
    let _ = incoming.unbounded_send(TransportEvent::Closed(reason));
}

async fn write_loop<S>(
    mut write: S,
    mut outgoing: UnboundedReceiver<OutgoingEvent>,
    mut pong: tokio::sync::mpsc::UnboundedReceiver<()>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        tokio::select! {
            next = outgoing.next() => match next {
                Some(out) => {
                    let frame = Packet::event(out.event, out.payload).encode();
                    if let Err(e) = write.send(Message::text(frame)).await {
                        crate::log_error!("Send failed: {}", e);
                        break;
                    }
                }
                None => {
                    crate::log_info!("Sender dropped, stopping write task");
                    let _ = write.send(Message::text(Packet::Disconnect.encode())).await;
                    let _ = write.close().await;
                    break;
                }
            },
            Some(()) = pong.recv() => {
                if let Err(e) = write.send(Message::text(Packet::Pong.encode())).await {
                    crate::log_error!("Pong failed: {}", e);
                    break;
                }
            }
        }
    }
}
