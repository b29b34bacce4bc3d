//! Inbound frame routing.
//!
//! Every text frame produces exactly one response frame on the same
//! connection. The reserved `type` field selects a directly-computed
//! response (`ping`, `test`); frames carrying an `api` field go to the
//! dispatcher; everything else falls through to the diagnostic echo.
//! Malformed input is answered with an error frame, never with a close.

use serde_json::{Value, json};

use crate::app_state::AppState;
use crate::config::AuthMode;
use crate::domain::ConnectionId;

/// Routes one inbound text frame to its response.
#[must_use]
pub fn route_frame(text: &str, state: &AppState, connection: ConnectionId) -> Value {
    let frame = match serde_json::from_str::<Value>(text) {
        Ok(frame @ Value::Object(_)) => frame,
        Ok(_) => return error_frame("expected a JSON object"),
        Err(_) => {
            tracing::warn!(connection = %connection, "received invalid JSON frame");
            return error_frame("invalid JSON, please send a valid JSON message");
        }
    };

    // Legacy per-message authentication. Handshake mode already verified
    // the secret at upgrade time and does no per-frame checks.
    if state.config.auth_mode == AuthMode::Message && state.config.auth_enabled() {
        let token = frame
            .get("access_token")
            .and_then(Value::as_str)
            .unwrap_or("");
        if token != state.config.access_token {
            tracing::warn!(connection = %connection, "frame with invalid access token");
            return error_frame("invalid access token");
        }
        state.registry.mark_authenticated(connection);
    }

    match frame.get("type").and_then(Value::as_str) {
        Some("ping") => json!({
            "type": "pong",
            "message": "pong",
            "timestamp": unix_now(),
        }),
        Some("test") => json!({
            "type": "test_response",
            "message": "test response ok",
            "echo": frame,
        }),
        _ => match frame.get("api").and_then(Value::as_str) {
            Some(endpoint) => {
                let payload = frame.get("data").cloned().unwrap_or_else(|| json!({}));
                let echo = frame.get("echo").cloned();
                let envelope = state.dispatcher.handle(endpoint, &payload, echo);
                serde_json::to_value(envelope)
                    .unwrap_or_else(|_| error_frame("internal error"))
            }
            None => json!({
                "type": "echo",
                "message": "message received",
                "original": frame,
            }),
        },
    }
}

/// Builds an error frame.
#[must_use]
pub fn error_frame(message: &str) -> Value {
    json!({"type": "error", "message": message})
}

/// Unix time in seconds as a float, millisecond precision.
#[allow(clippy::cast_precision_loss)]
fn unix_now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_millis()) / 1000.0
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::HostDispatcher;
    use crate::config::BridgeConfig;
    use crate::domain::ConnectionRegistry;
    use crate::domain::registry::ConnectionHandle;
    use crate::host::LoggingHost;

    fn state(config: BridgeConfig) -> AppState {
        AppState {
            registry: Arc::new(ConnectionRegistry::new()),
            dispatcher: Arc::new(HostDispatcher::new(Arc::new(LoggingHost))),
            config: Arc::new(config),
        }
    }

    fn register(
        state: &AppState,
        authenticated: bool,
    ) -> (
        ConnectionId,
        tokio::sync::mpsc::UnboundedReceiver<axum::extract::ws::Message>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let id = ConnectionId::new();
        let Ok(addr) = "127.0.0.1:50000".parse() else {
            panic!("addr parse failed");
        };
        state
            .registry
            .add(ConnectionHandle::new(id, addr, authenticated, tx));
        (id, rx)
    }

    #[test]
    fn ping_yields_pong_with_timestamp() {
        let state = state(BridgeConfig::default());
        let response = route_frame(r#"{"type":"ping"}"#, &state, ConnectionId::new());
        assert_eq!(response["type"], "pong");
        assert_eq!(response["message"], "pong");
        assert!(response["timestamp"].as_f64().is_some_and(|t| t > 0.0));
    }

    #[test]
    fn test_frame_echoes_original() {
        let state = state(BridgeConfig::default());
        let response = route_frame(r#"{"type":"test","n":1}"#, &state, ConnectionId::new());
        assert_eq!(response["type"], "test_response");
        assert_eq!(response["echo"]["n"], 1);
    }

    #[test]
    fn frame_without_type_or_api_falls_through_to_echo() {
        let state = state(BridgeConfig::default());
        let response = route_frame(r#"{"hello":"world"}"#, &state, ConnectionId::new());
        assert_eq!(response["type"], "echo");
        assert_eq!(response["original"]["hello"], "world");
    }

    #[test]
    fn invalid_json_answers_error_and_connection_survives() {
        let state = state(BridgeConfig::default());
        let id = ConnectionId::new();
        let response = route_frame("{not json", &state, id);
        assert_eq!(response["type"], "error");

        // A subsequent valid frame still succeeds.
        let response = route_frame(r#"{"type":"ping"}"#, &state, id);
        assert_eq!(response["type"], "pong");
    }

    #[test]
    fn non_object_json_answers_error() {
        let state = state(BridgeConfig::default());
        let response = route_frame("42", &state, ConnectionId::new());
        assert_eq!(response["type"], "error");
    }

    #[test]
    fn api_broadcast_scenario() {
        let state = state(BridgeConfig::default());
        let response = route_frame(
            r#"{"api":"broadcast","data":{"message":"hi"},"echo":"42"}"#,
            &state,
            ConnectionId::new(),
        );
        assert_eq!(response["status"], "ok");
        assert_eq!(response["message"], "Message broadcasted");
        assert_eq!(response["echo"], "42");
    }

    #[test]
    fn message_mode_rejects_bad_token_but_keeps_connection() {
        let mut config = BridgeConfig::default();
        config.auth_mode = AuthMode::Message;
        config.access_token = "S".to_string();
        let state = state(config);
        let (id, _rx) = register(&state, false);

        let response = route_frame(r#"{"type":"ping"}"#, &state, id);
        assert_eq!(response["type"], "error");
        assert_eq!(response["message"], "invalid access token");
        assert_eq!(state.registry.authenticated_count(), 0);

        let response = route_frame(r#"{"type":"ping","access_token":"wrong"}"#, &state, id);
        assert_eq!(response["type"], "error");
        assert_eq!(state.registry.count(), 1);
    }

    #[test]
    fn message_mode_valid_token_authenticates_connection() {
        let mut config = BridgeConfig::default();
        config.auth_mode = AuthMode::Message;
        config.access_token = "S".to_string();
        let state = state(config);
        let (id, _rx) = register(&state, false);

        let response = route_frame(r#"{"type":"ping","access_token":"S"}"#, &state, id);
        assert_eq!(response["type"], "pong");
        assert_eq!(state.registry.authenticated_count(), 1);
    }

    #[test]
    fn message_mode_without_secret_skips_token_check() {
        let mut config = BridgeConfig::default();
        config.auth_mode = AuthMode::Message;
        let state = state(config);
        let response = route_frame(r#"{"type":"ping"}"#, &state, ConnectionId::new());
        assert_eq!(response["type"], "pong");
    }
}
