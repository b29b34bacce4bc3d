//! API dispatcher: named host-side actions behind one entry point.
//!
//! The message router only knows [`ApiDispatcher::handle`]; everything a
//! fault can do is produce a `"failed"` envelope. [`HostDispatcher`] is
//! the concrete dispatcher mapping the fixed endpoint table onto the
//! narrow [`Host`] contract.

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};

use super::envelope::ApiEnvelope;
use crate::host::Host;

/// Executes one named host-side action.
///
/// Implementations must never panic across this boundary: unknown
/// endpoints and internal failures both yield a `"failed"` envelope with
/// the correlation token preserved.
pub trait ApiDispatcher: Send + Sync {
    /// Runs `endpoint` with `payload`, answering with an [`ApiEnvelope`].
    fn handle(&self, endpoint: &str, payload: &Value, echo: Option<Value>) -> ApiEnvelope;
}

/// Dispatcher over the host application.
pub struct HostDispatcher {
    host: Arc<dyn Host>,
}

impl fmt::Debug for HostDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDispatcher").finish_non_exhaustive()
    }
}

impl HostDispatcher {
    /// Creates a dispatcher acting on the given host.
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    fn broadcast(&self, payload: &Value, echo: Option<Value>) -> ApiEnvelope {
        let Some(message) = message_text(payload.get("message")) else {
            return ApiEnvelope::failed("Missing message parameter", echo);
        };
        match self.host.broadcast(&message) {
            Ok(()) => ApiEnvelope::ok("Message broadcasted", echo),
            Err(e) => ApiEnvelope::failed(format!("Failed to broadcast message: {e}"), echo),
        }
    }

    fn send_private_msg(&self, payload: &Value, echo: Option<Value>) -> ApiEnvelope {
        let Some(message) = message_text(payload.get("message")) else {
            return ApiEnvelope::failed("Missing message parameter", echo);
        };
        let nickname = payload.get("nickname").and_then(Value::as_str);
        let uuid = payload.get("uuid").and_then(Value::as_str);
        if nickname.is_none() && uuid.is_none() {
            return ApiEnvelope::failed("Missing player identifier (uuid or nickname)", echo);
        }
        // Players are addressed by nickname; a bare UUID cannot be resolved.
        let Some(player) = nickname else {
            return ApiEnvelope::failed("Player not found", echo);
        };
        match self.host.tell(player, &message) {
            Ok(()) => ApiEnvelope::ok_with_data(
                "Private message sent",
                echo,
                json!({"player": {"nickname": player, "uuid": uuid.unwrap_or("")}}),
            ),
            Err(e) => ApiEnvelope::failed(format!("Failed to send private message: {e}"), echo),
        }
    }

    fn send_title(&self, payload: &Value, echo: Option<Value>) -> ApiEnvelope {
        let Some(title) = message_text(payload.get("title")) else {
            return ApiEnvelope::failed("Missing title parameter", echo);
        };
        let subtitle = message_text(payload.get("subtitle"));
        let fadein = payload.get("fadein").and_then(Value::as_u64).unwrap_or(10);
        let stay = payload.get("stay").and_then(Value::as_u64).unwrap_or(70);
        let fadeout = payload.get("fadeout").and_then(Value::as_u64).unwrap_or(20);

        let result = self
            .host
            .execute(&format!("title @a times {fadein} {stay} {fadeout}"))
            .and_then(|()| {
                self.host
                    .execute(&format!("title @a title {}", component(&title)))
            })
            .and_then(|()| match subtitle {
                Some(ref text) if !text.is_empty() => self
                    .host
                    .execute(&format!("title @a subtitle {}", component(text))),
                _ => Ok(()),
            });

        match result {
            Ok(()) => ApiEnvelope::ok("Title displayed", echo),
            Err(e) => ApiEnvelope::failed(format!("Failed to display title: {e}"), echo),
        }
    }

    fn send_actionbar(&self, payload: &Value, echo: Option<Value>) -> ApiEnvelope {
        let Some(message) = message_text(payload.get("message")) else {
            return ApiEnvelope::failed("Missing message parameter", echo);
        };
        match self
            .host
            .execute(&format!("title @a actionbar {}", component(&message)))
        {
            Ok(()) => ApiEnvelope::ok("Actionbar message displayed", echo),
            Err(e) => {
                ApiEnvelope::failed(format!("Failed to display actionbar message: {e}"), echo)
            }
        }
    }

    fn get_player_list(&self, echo: Option<Value>) -> ApiEnvelope {
        let players: Vec<Value> = self
            .host
            .online_players()
            .into_iter()
            .map(|nickname| {
                let uuid = self.host.player_uuid(&nickname).unwrap_or_default();
                json!({
                    "nickname": nickname,
                    "uuid": uuid,
                    "is_op": false,
                    "dimension": Value::Null,
                    "coordinate": Value::Null,
                    "permission_level": 0,
                    "online": true,
                })
            })
            .collect();
        let count = players.len();
        ApiEnvelope::ok_with_data(
            "Player list retrieved",
            echo,
            json!({
                "players": players,
                "count": count,
                "max_players": self.host.max_players(),
            }),
        )
    }

    fn get_player_info(&self, payload: &Value, echo: Option<Value>) -> ApiEnvelope {
        let Some(name) = payload.get("player_name").and_then(Value::as_str) else {
            return ApiEnvelope::failed("Missing player_name parameter", echo);
        };

        let permission_level = self.host.player_permission_level(name);
        // Native op status when the host reports it, permission fallback
        // otherwise.
        let is_op = self
            .host
            .player_is_op(name)
            .or(permission_level.map(|level| level >= 3));
        let online = self.host.online_players().iter().any(|p| p == name);

        let player = json!({
            "nickname": name,
            "uuid": self.host.player_uuid(name).unwrap_or_default(),
            "is_op": is_op,
            "dimension": self.host.player_dimension(name),
            "coordinate": self.host.player_coordinate(name),
            "permission_level": permission_level.unwrap_or(0),
            "online": online,
        });
        ApiEnvelope::ok_with_data("Player info retrieved", echo, json!({"player": player}))
    }
}

impl ApiDispatcher for HostDispatcher {
    fn handle(&self, endpoint: &str, payload: &Value, echo: Option<Value>) -> ApiEnvelope {
        tracing::debug!(endpoint, "api request");
        match endpoint {
            "broadcast" | "send_msg" => self.broadcast(payload, echo),
            "send_private_msg" => self.send_private_msg(payload, echo),
            "send_title" => self.send_title(payload, echo),
            "send_actionbar" => self.send_actionbar(payload, echo),
            "get_player_list" => self.get_player_list(echo),
            "get_player_info" => self.get_player_info(payload, echo),
            other => ApiEnvelope::failed(format!("Unknown API: {other}"), echo),
        }
    }
}

/// Extracts plain text from a message value: a string, a rich-text
/// object with a `text` field, or an array of such segments.
fn message_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string),
        Value::Array(segments) => {
            let mut out = String::new();
            for segment in segments {
                out.push_str(&message_text(Some(segment))?);
            }
            Some(out)
        }
        _ => None,
    }
}

/// Renders plain text as a JSON text component for `title` commands.
fn component(text: &str) -> String {
    json!({"text": text}).to_string()
}
