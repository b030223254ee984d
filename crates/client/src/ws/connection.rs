//! Connection lifecycle types and per-session configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gruzreis_shared::{AuthRequest, SOCKET_PATH};

/// Lifecycle state of the single backend connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// Whether a manual `connect()` may start from this state.
    pub fn accepts_connect(&self) -> bool {
        matches!(self, ConnectionStatus::Disconnected | ConnectionStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Authenticating => "authenticating",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

crate::shallow_eq_by_value!(ConnectionStatus);

/// Broadcast to status observers on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: ConnectionStatus,
    /// Reconnect attempt counter at the time of the transition.
    pub attempt: u32,
    /// Set on transitions into `Error`.
    pub error: Option<String>,
}

/// Linear backoff: attempt `n` waits `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            base_delay_ms: 1000,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            enabled: true,
            max_attempts,
            base_delay_ms: base_delay_ms.max(1),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt number (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Login/password pair for the `authorization` handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    pub(crate) fn to_request(&self) -> AuthRequest {
        AuthRequest {
            login: self.login.clone(),
            password: self.password.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

pub const DEFAULT_ENDPOINT: &str = "https://gruzreis.ru";
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to open (and re-open) one session.
///
/// Immutable once handed to `connect()`; a new session gets a new config.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// `http(s)://` or `ws(s)://` origin of the backend.
    pub endpoint: String,
    pub path: String,
    /// Bearer token sent with the namespace connect.
    pub token: Option<String>,
    /// When set, `connect()` resolves only after a successful handshake.
    pub credentials: Option<Credentials>,
    pub reconnect: ReconnectPolicy,
    pub auth_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            path: SOCKET_PATH.to_string(),
            token: None,
            credentials: None,
            reconnect: ReconnectPolicy::default(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Build from environment variables.
    ///
    /// Environment variables:
    /// - `GRUZREIS_ENDPOINT` (default: "https://gruzreis.ru")
    /// - `GRUZREIS_SOCKET_PATH` (default: "/node/socket.io/")
    /// - `GRUZREIS_TOKEN` (default: unset)
    /// - `GRUZREIS_RECONNECT`: "true" | "false" (default: "true")
    /// - `GRUZREIS_RECONNECT_ATTEMPTS` (default: 5)
    /// - `GRUZREIS_RECONNECT_DELAY_MS` (default: 1000)
    /// - `GRUZREIS_AUTH_TIMEOUT_MS` (default: 10000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let endpoint = lookup("GRUZREIS_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let mut config = Self::new(endpoint);

        if let Some(path) = lookup("GRUZREIS_SOCKET_PATH") {
            config.path = path;
        }
        config.token = lookup("GRUZREIS_TOKEN").filter(|t| !t.is_empty());

        let defaults = ReconnectPolicy::default();
        let enabled = match lookup("GRUZREIS_RECONNECT").map(|v| v.to_lowercase()) {
            None => defaults.enabled,
            Some(v) if v == "true" || v == "1" => true,
            Some(v) if v == "false" || v == "0" => false,
            Some(v) => {
                crate::log_warn!("Invalid GRUZREIS_RECONNECT '{}', using default", v);
                defaults.enabled
            }
        };
        config.reconnect = ReconnectPolicy {
            enabled,
            max_attempts: parse_or(&lookup, "GRUZREIS_RECONNECT_ATTEMPTS", defaults.max_attempts),
            base_delay_ms: parse_or(&lookup, "GRUZREIS_RECONNECT_DELAY_MS", defaults.base_delay_ms)
                .max(1),
        };
        config.auth_timeout = Duration::from_millis(parse_or(
            &lookup,
            "GRUZREIS_AUTH_TIMEOUT_MS",
            DEFAULT_AUTH_TIMEOUT.as_millis() as u64,
        ));

        config
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            crate::log_warn!("Invalid {} '{}', using default {}", key, raw, default);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn backoff_is_linear() {
        let policy = ReconnectPolicy::new(5, 1000);
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 3000, 4000, 5000]);
    }

    #[test]
    fn zero_base_delay_is_clamped() {
        assert_eq!(ReconnectPolicy::new(3, 0).base_delay_ms, 1);
    }

    #[test]
    fn env_defaults() {
        let config = ConnectionConfig::from_lookup(env(&[]));
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.path, SOCKET_PATH);
        assert_eq!(config.token, None);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert_eq!(config.auth_timeout, DEFAULT_AUTH_TIMEOUT);
    }

    #[test]
    fn env_overrides_and_bad_values() {
        let config = ConnectionConfig::from_lookup(env(&[
            ("GRUZREIS_ENDPOINT", "http://localhost:3000"),
            ("GRUZREIS_TOKEN", "tok"),
            ("GRUZREIS_RECONNECT", "false"),
            ("GRUZREIS_RECONNECT_ATTEMPTS", "lots"),
            ("GRUZREIS_RECONNECT_DELAY_MS", "250"),
        ]));
        assert_eq!(config.endpoint, "http://localhost:3000");
        assert_eq!(config.token.as_deref(), Some("tok"));
        assert!(!config.reconnect.enabled);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.base_delay_ms, 250);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("user", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ConnectionStatus::Authenticating).unwrap(),
            serde_json::json!("authenticating")
        );
        assert!(ConnectionStatus::Error.accepts_connect());
        assert!(!ConnectionStatus::Reconnecting.accepts_connect());
    }
}
