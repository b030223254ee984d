//! Socket.IO wire format and the gruzreis event vocabulary.
//!
//! The backend speaks Socket.IO v4 over a WebSocket mounted under
//! [`SOCKET_PATH`]. Only the default namespace is used. Each WebSocket text
//! frame is one Engine.IO packet; Socket.IO packets ride inside Engine.IO
//! `message` (`4`) packets:
//!
//! ```text
//! 0{"sid":"…","pingInterval":25000,"pingTimeout":20000}   engine open
//! 2 / 3                                                   ping / pong
//! 40{"token":"…"}                                         namespace connect
//! 42["get_cargos",{"token":"…"}]                          event
//! 44{"message":"…"}                                       connect error
//! 41                                                      disconnect
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Path prefix the backend mounts Socket.IO under.
pub const SOCKET_PATH: &str = "/node/socket.io/";

/// Engine.IO protocol revision negotiated in the query string.
pub const ENGINE_IO_VERSION: &str = "4";

/// Reserved event carrying the credential handshake.
pub const AUTH_EVENT: &str = "authorization";

/// Domain events exchanged through the connection.
pub mod events {
    pub const GET_CARGOS: &str = "get_cargos";
    pub const SET_CARGO: &str = "set_cargo";
    pub const SAVE_CARGO: &str = "save_cargo";
    pub const DELETE_CARGO: &str = "delete_cargo";
    pub const PUBLISH: &str = "publish";
    pub const CARGO_UPDATED: &str = "cargo_updated";
    pub const NEW_OFFER: &str = "new_offer";
}

// --- Requests and responses ---

/// Body of the `authorization` request.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthRequest {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// Domain request: the session token plus the event-specific body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<T> {
    pub token: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T> TokenRequest<T> {
    pub fn new(token: impl Into<String>, body: T) -> Self {
        Self {
            token: token.into(),
            body,
        }
    }
}

/// Reference to a cargo by guid (`delete_cargo`, `publish`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CargoRef {
    pub guid: String,
}

/// Empty body for requests that only carry the token (`get_cargos`).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NoBody {}

/// `{ success, data?, message? }` response envelope.
///
/// Parsing is deliberately lenient about shape and strict about outcome: a
/// payload without a boolean `success` is a failure, and so is one whose
/// `data` does not decode into `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T: DeserializeOwned> ServerResponse<T> {
    pub fn from_payload(payload: &Value) -> Self {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let success = payload
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let data = match payload.get("data") {
            None | Some(Value::Null) => None,
            Some(raw) => match T::deserialize(raw) {
                Ok(data) => Some(data),
                Err(e) => {
                    return Self {
                        success: false,
                        data: None,
                        message: Some(format!("malformed response data: {e}")),
                    }
                }
            },
        };

        Self {
            success,
            data,
            message,
        }
    }
}

impl<T> ServerResponse<T> {
    /// `Ok(data)` on success, otherwise the server message or `fallback`.
    pub fn into_result(self, fallback: &str) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self.message.unwrap_or_else(|| fallback.to_string()))
        }
    }

    /// Like [`into_result`](Self::into_result), but a success without
    /// `data` is a failure too.
    pub fn into_data(self, fallback: &str) -> Result<T, String> {
        match self.into_result(fallback)? {
            Some(data) => Ok(data),
            None => Err(fallback.to_string()),
        }
    }
}

// --- Packets ---

/// Engine.IO handshake sent by the server right after the upgrade.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    pub max_payload: u64,
}

/// One frame of the Engine.IO/Socket.IO stream, default namespace only.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace connect. Carries the auth object client-side and the sid
    /// object in the server's acknowledgement.
    Connect(Option<Value>),
    Disconnect,
    Event { event: String, payload: Value },
    ConnectError(Value),
}

impl Packet {
    pub fn event(event: impl Into<String>, payload: Value) -> Self {
        Packet::Event {
            event: event.into(),
            payload,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(info) => format!("0{}", Value::from(info)),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect(None) => "40".to_string(),
            Packet::Connect(Some(auth)) => format!("40{auth}"),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { event, payload } => {
                let args = if payload.is_null() {
                    Value::Array(vec![Value::String(event.clone())])
                } else {
                    Value::Array(vec![Value::String(event.clone()), payload.clone()])
                };
                format!("42{args}")
            }
            Packet::ConnectError(body) => format!("44{body}"),
        }
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let kind = frame.chars().next().ok_or(ProtocolError::Empty)?;
        let rest = &frame[kind.len_utf8()..];
        match kind {
            '0' => Ok(Packet::Open(parse_json(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket_packet(rest),
            '6' => Ok(Packet::Noop),
            other => Err(ProtocolError::UnknownPacket(other)),
        }
    }
}

impl From<&OpenInfo> for Value {
    fn from(info: &OpenInfo) -> Self {
        serde_json::to_value(info).unwrap_or(Value::Null)
    }
}

fn decode_socket_packet(frame: &str) -> Result<Packet, ProtocolError> {
    let kind = frame.chars().next().ok_or(ProtocolError::Empty)?;
    let body = strip_namespace(&frame[kind.len_utf8()..]);
    // Acknowledgement ids precede the JSON body; acks are not used.
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());

    match kind {
        '0' => Ok(Packet::Connect(parse_optional(body)?)),
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(body),
        '4' => Ok(Packet::ConnectError(
            parse_optional(body)?.unwrap_or(Value::Null),
        )),
        other => Err(ProtocolError::UnknownPacket(other)),
    }
}

fn strip_namespace(body: &str) -> &str {
    if !body.starts_with('/') {
        return body;
    }
    match body.find(',') {
        Some(idx) => &body[idx + 1..],
        None => "",
    }
}

fn decode_event(body: &str) -> Result<Packet, ProtocolError> {
    let Value::Array(mut args) = parse_json::<Value>(body)? else {
        return Err(ProtocolError::MissingEventName);
    };
    if args.is_empty() {
        return Err(ProtocolError::MissingEventName);
    }
    let Value::String(event) = args.remove(0) else {
        return Err(ProtocolError::MissingEventName);
    };

    let payload = match args.len() {
        0 => Value::Null,
        1 => args.remove(0),
        _ => Value::Array(args),
    };
    Ok(Packet::Event { event, payload })
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(body).map_err(|e| ProtocolError::Json(e.to_string()))
}

fn parse_optional(body: &str) -> Result<Option<Value>, ProtocolError> {
    if body.trim().is_empty() {
        Ok(None)
    } else {
        parse_json(body).map(Some)
    }
}
