//! Administrative command surface.
//!
//! The host exposes a handful of operator commands (start, stop, status,
//! reload) that drive the [`BridgeServer`] lifecycle. Parsing and
//! execution live here so every front end (the binary's stdin loop, a
//! host plugin shim) renders the same responses.

use crate::server::BridgeServer;

/// One parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Start the WebSocket listener.
    Start,
    /// Stop the WebSocket listener.
    Stop,
    /// Report lifecycle state and connection count.
    Status,
    /// Re-read configuration; applies on the next start.
    Reload,
    /// Show usage.
    Help,
}

impl AdminCommand {
    /// Parses a trimmed input line into a command, `None` when the line
    /// is not a known command.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "status" => Some(Self::Status),
            "reload" => Some(Self::Reload),
            "help" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Usage text for [`AdminCommand::Help`].
const HELP_TEXT: &str = "Commands:\n  \
    start   - start the WebSocket server\n  \
    stop    - stop the WebSocket server\n  \
    status  - show server status\n  \
    reload  - reload configuration (applies on next start)\n  \
    help    - show this help";

/// Runs a command against the server and renders the operator response.
#[must_use]
pub fn execute(server: &BridgeServer, command: AdminCommand) -> String {
    match command {
        AdminCommand::Start => {
            if server.is_running() {
                return "WebSocket server is already running".to_string();
            }
            match server.start() {
                Ok(addr) => format!("WebSocket server started on {addr}"),
                Err(e) => format!("Failed to start WebSocket server: {e}"),
            }
        }
        AdminCommand::Stop => {
            if !server.is_running() {
                return "WebSocket server is not running".to_string();
            }
            let timeout = server.config().stop_timeout;
            server.stop(timeout);
            "WebSocket server stopped".to_string()
        }
        AdminCommand::Status => match server.local_addr() {
            Some(addr) if server.is_running() => format!(
                "WebSocket server is running on {addr} ({} connections, {} authenticated)",
                server.connection_count(),
                server.registry().authenticated_count(),
            ),
            _ => "WebSocket server is stopped".to_string(),
        },
        AdminCommand::Reload => match server.reload_config() {
            Ok(()) => "Configuration reloaded; applies on next start".to_string(),
            Err(e) => format!("Failed to reload configuration: {e}"),
        },
        AdminCommand::Help => HELP_TEXT.to_string(),
    }
}
