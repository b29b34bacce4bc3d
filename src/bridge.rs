//! Host-to-client event bridge.
//!
//! [`EventBridge`] is the synchronous entry point for host callbacks
//! (joins, quits, chat, server log lines). Each call grabs the listener
//! runtime handle, hops off the host context with `spawn_blocking`,
//! enriches the event with player details from the [`Host`], and fans
//! the finished envelope out through the registry. When the server is
//! not Running the event is dropped with a trace log; the host is never
//! blocked and never sees an error.

use std::fmt;
use std::sync::Arc;

use crate::domain::{EventEnvelope, PlayerData, PostType, SubType};
use crate::host::Host;
use crate::server::BridgeServer;

/// Chat lines with this prefix are host-local commands and never leave
/// the host.
const LOCAL_COMMAND_PREFIX: &str = "!!";

/// Server log fragments that mark a death message. The victim is the
/// first whitespace-separated token of the line.
const DEATH_KEYWORDS: [&str; 12] = [
    "was slain",
    "was shot",
    "was killed",
    "drowned",
    "blew up",
    "hit the ground",
    "fell from",
    "burned to death",
    "tried to swim in lava",
    "fell out of the world",
    "withered away",
    "suffocated",
];

/// Bridges synchronous host callbacks into WebSocket broadcasts.
pub struct EventBridge {
    server: Arc<BridgeServer>,
    host: Arc<dyn Host>,
}

impl fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBridge").finish_non_exhaustive()
    }
}

impl EventBridge {
    /// Builds a bridge over a server and the host it reports for.
    #[must_use]
    pub fn new(server: Arc<BridgeServer>, host: Arc<dyn Host>) -> Self {
        Self { server, host }
    }

    /// A player finished joining the server.
    pub fn player_joined(&self, player: &str) {
        self.dispatch(PostType::Notice, SubType::Join, player, None, true);
    }

    /// A player disconnected. The player is already gone, so the
    /// envelope carries only the nickname.
    pub fn player_left(&self, player: &str) {
        self.dispatch(PostType::Notice, SubType::Quit, player, None, false);
    }

    /// A player sent a chat line. Slash-prefixed lines become command
    /// events; host-local `!!` lines are ignored.
    pub fn player_chat(&self, player: &str, content: &str) {
        if content.starts_with(LOCAL_COMMAND_PREFIX) {
            return;
        }
        let sub_type = if content.starts_with('/') {
            SubType::PlayerCommand
        } else {
            SubType::Chat
        };
        self.dispatch(PostType::Message, sub_type, player, Some(content.to_string()), true);
    }

    /// The server logged an informational line. Only death messages are
    /// bridged; everything else is ignored. The victim is still queryable
    /// at death time, so the event is enriched like a join.
    pub fn server_info(&self, content: &str) {
        if let Some(player) = death_subject(content) {
            self.dispatch(
                PostType::Message,
                SubType::Death,
                &player,
                Some(content.to_string()),
                true,
            );
        }
    }

    /// Fans out an already-built envelope without enrichment.
    pub fn broadcast_envelope(&self, envelope: EventEnvelope) {
        let Some(handle) = self.server.runtime_handle() else {
            tracing::trace!(event = %envelope.event_name, "event dropped, server not running");
            return;
        };
        let registry = Arc::clone(self.server.registry());
        handle.spawn_blocking(move || {
            let delivered = registry.broadcast(&envelope);
            tracing::debug!(event = %envelope.event_name, delivered, "event dispatched");
        });
    }

    fn dispatch(
        &self,
        post_type: PostType,
        sub_type: SubType,
        player: &str,
        message: Option<String>,
        enrich: bool,
    ) {
        let Some(handle) = self.server.runtime_handle() else {
            tracing::trace!(sub_type = sub_type.as_str(), "event dropped, server not running");
            return;
        };
        let registry = Arc::clone(self.server.registry());
        let host = Arc::clone(&self.host);
        let config = self.server.config();
        let player = player.to_string();

        handle.spawn_blocking(move || {
            let version = host
                .server_version()
                .unwrap_or_else(|| "unknown".to_string());
            let mut envelope = EventEnvelope::new(
                config.server_name.as_str(),
                version,
                config.server_type.as_str(),
                post_type,
                sub_type,
            );

            let mut data = PlayerData::bare(&player);
            if enrich {
                if let Some(uuid) = host.player_uuid(&player) {
                    data.uuid = uuid;
                } else {
                    tracing::debug!(player = %player, "player details unavailable");
                }
                data.is_op = host.player_is_op(&player);
                data.dimension = host.player_dimension(&player);
                data.coordinate = host.player_coordinate(&player);
            }
            envelope.player = Some(data);
            envelope.message = message;

            let delivered = registry.broadcast(&envelope);
            tracing::debug!(event = %envelope.event_name, delivered, "host event dispatched");
        });
    }
}

/// Extracts the victim from a death message, or `None` when the line is
/// not a death message.
fn death_subject(message: &str) -> Option<String> {
    let trimmed = message.trim();
    if !DEATH_KEYWORDS.iter().any(|keyword| trimmed.contains(keyword)) {
        return None;
    }
    let mut parts = trimmed.split_whitespace();
    let subject = parts.next()?;
    // A bare keyword with no subject is not a player death.
    parts.next()?;
    Some(subject.to_string())
}
