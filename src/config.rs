//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), prefixed with `QUEQIAO_`. Defaults
//! match the stock deployment of the original bridge plugin.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::BridgeError;

/// How clients prove knowledge of the shared secret.
///
/// The two modes are mutually exclusive per deployment: handshake mode
/// performs no per-frame token checks, and message mode admits every
/// upgrade without inspecting headers. Both are disabled entirely when
/// [`BridgeConfig::access_token`] is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Verify `Authorization: Bearer <secret>` during the upgrade
    /// handshake. Admitted connections are immediately authenticated.
    Handshake,
    /// Legacy compatibility: admit every connection and require an
    /// `access_token` field on each inbound frame.
    Message,
}

impl AuthMode {
    /// Parses a mode name (`"handshake"` or `"message"`, case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] for any other value.
    pub fn parse(value: &str) -> Result<Self, BridgeError> {
        match value.to_ascii_lowercase().as_str() {
            "handshake" => Ok(Self::Handshake),
            "message" => Ok(Self::Message),
            other => Err(BridgeError::Config(format!(
                "unknown auth mode {other:?}, expected \"handshake\" or \"message\""
            ))),
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`BridgeConfig::from_env`]; a running
/// listener keeps the configuration it was started with until the next
/// stop/start cycle.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Socket address to bind the WebSocket listener to.
    pub listen_addr: SocketAddr,

    /// URL path the upgrade request must target (e.g. `/ws`).
    pub ws_path: String,

    /// Shared secret; empty string disables authentication in both modes.
    pub access_token: String,

    /// Authentication mode, see [`AuthMode`].
    pub auth_mode: AuthMode,

    /// Whether the listener starts together with the process.
    pub auto_start: bool,

    /// Host server name reported in every event envelope.
    pub server_name: String,

    /// Host server type tag reported in every event envelope.
    pub server_type: String,

    /// Window granted to the listener thread to bind and report readiness.
    pub startup_timeout: Duration,

    /// Default budget for a graceful [`crate::server::BridgeServer::stop`].
    pub stop_timeout: Duration,
}

impl BridgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set. Calls
    /// `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `QUEQIAO_LISTEN_ADDR` cannot be parsed as a
    /// [`SocketAddr`] or `QUEQIAO_AUTH_MODE` names an unknown mode.
    pub fn from_env() -> Result<Self, BridgeError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("QUEQIAO_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| BridgeError::Config(format!("invalid QUEQIAO_LISTEN_ADDR: {e}")))?;

        let ws_path = normalize_path(
            &std::env::var("QUEQIAO_WS_PATH").unwrap_or_else(|_| "/ws".to_string()),
        );

        let access_token = std::env::var("QUEQIAO_ACCESS_TOKEN").unwrap_or_default();

        let auth_mode = match std::env::var("QUEQIAO_AUTH_MODE") {
            Ok(value) => AuthMode::parse(&value)?,
            Err(_) => AuthMode::Handshake,
        };

        let auto_start = parse_env_bool("QUEQIAO_AUTO_START", true);
        let server_name =
            std::env::var("QUEQIAO_SERVER_NAME").unwrap_or_else(|_| "MCDR Server".to_string());
        let server_type =
            std::env::var("QUEQIAO_SERVER_TYPE").unwrap_or_else(|_| "mcdr".to_string());

        let startup_timeout = Duration::from_secs(parse_env("QUEQIAO_STARTUP_TIMEOUT_SECS", 5));
        let stop_timeout = Duration::from_secs(parse_env("QUEQIAO_STOP_TIMEOUT_SECS", 10));

        Ok(Self {
            listen_addr,
            ws_path,
            access_token,
            auth_mode,
            auto_start,
            server_name,
            server_type,
            startup_timeout,
            stop_timeout,
        })
    }

    /// Returns `true` when a shared secret is configured.
    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        !self.access_token.is_empty()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_path: "/ws".to_string(),
            access_token: String::new(),
            auth_mode: AuthMode::Handshake,
            auto_start: true,
            server_name: "MCDR Server".to_string(),
            server_type: "mcdr".to_string(),
            startup_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// Ensures a configured path starts with `/` and carries no trailing slash.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}
