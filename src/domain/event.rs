//! QueQiao event envelope types.
//!
//! Host-originated events are serialized once and fanned out to every
//! authenticated client. The wire shape follows the QueQiao protocol:
//! a flat envelope carrying server identity, an event classification
//! (`post_type` / `sub_type` / derived `event_name`), the subject player
//! and, for message-type events, the message text.

use serde::{Deserialize, Serialize};

/// Fixed prefix of every derived `event_name`.
pub const EVENT_NAME_PREFIX: &str = "MCDR";

/// Coarse event classification on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    /// Presence changes: join, quit.
    Notice,
    /// Text-carrying events: chat, death, player commands.
    Message,
}

/// Fine event classification on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubType {
    /// A player joined the host server.
    Join,
    /// A player left the host server.
    Quit,
    /// A player sent a chat message.
    Chat,
    /// A player died (parsed from the host console stream).
    Death,
    /// A player issued a `/`-prefixed command.
    PlayerCommand,
}

impl SubType {
    /// Returns the snake_case wire name of this sub type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Quit => "quit",
            Self::Chat => "chat",
            Self::Death => "death",
            Self::PlayerCommand => "player_command",
        }
    }

    /// Derives the protocol `event_name`: [`EVENT_NAME_PREFIX`] followed
    /// by the capitalized sub type. `player_command` keeps its underscore
    /// verbatim with only the first segment capitalized.
    #[must_use]
    pub fn event_name(&self) -> String {
        match self {
            Self::PlayerCommand => format!("{EVENT_NAME_PREFIX}Player_command"),
            other => format!("{EVENT_NAME_PREFIX}{}", capitalize(other.as_str())),
        }
    }
}

/// Uppercases the first character and lowercases the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// World position of a player; any axis may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Coordinate {
    /// X position.
    pub x: Option<f64>,
    /// Y position.
    pub y: Option<f64>,
    /// Z position.
    pub z: Option<f64>,
}

/// The subject player of an event.
///
/// Everything beyond the nickname is enrichment queried from the host
/// after the originating callback has returned; each field is an explicit
/// "unavailable" (`None` / empty string) when the host cannot answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    /// Player nickname, always known.
    pub nickname: String,
    /// Player UUID as reported by the host; empty string when unknown.
    pub uuid: String,
    /// Operator status; `None` when the host could not be queried.
    pub is_op: Option<bool>,
    /// Dimension the player is in, if known.
    pub dimension: Option<String>,
    /// Player position, if known.
    pub coordinate: Option<Coordinate>,
}

impl PlayerData {
    /// Creates player data carrying only the nickname, all enrichment
    /// fields marked unavailable.
    #[must_use]
    pub fn bare(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            uuid: String::new(),
            is_op: None,
            dimension: None,
            coordinate: None,
        }
    }
}

/// One host-originated event as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Configured host server name.
    pub server_name: String,
    /// Host server version; `"unknown"` when the host cannot report it.
    pub server_version: String,
    /// Configured host server type tag.
    pub server_type: String,
    /// Coarse classification.
    pub post_type: PostType,
    /// Fine classification.
    pub sub_type: SubType,
    /// Derived name, see [`SubType::event_name`].
    pub event_name: String,
    /// Subject player.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerData>,
    /// Message text for message-type events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EventEnvelope {
    /// Builds an envelope with the `event_name` derived from `sub_type`
    /// and no player or message attached yet.
    #[must_use]
    pub fn new(
        server_name: impl Into<String>,
        server_version: impl Into<String>,
        server_type: impl Into<String>,
        post_type: PostType,
        sub_type: SubType,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            server_version: server_version.into(),
            server_type: server_type.into(),
            post_type,
            sub_type,
            event_name: sub_type.event_name(),
            player: None,
            message: None,
        }
    }
}
