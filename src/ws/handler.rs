//! Axum WebSocket upgrade handler and handshake authentication.
//!
//! In handshake mode the shared secret is verified here, before a
//! connection ever reaches the registry: a rejected upgrade leaves no
//! trace beyond the log line. Path mismatches are answered by the router
//! fallback with `400 Bad Request`, independent of the secret.

use std::net::SocketAddr;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::config::AuthMode;

/// `GET <ws_path>` — Upgrade HTTP connection to WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let handshake_auth = state.config.auth_mode == AuthMode::Handshake && state.config.auth_enabled();

    if handshake_auth && !token_matches(&headers, &state.config.access_token) {
        tracing::warn!(%remote, "rejected upgrade with missing or invalid bearer token");
        return unauthorized();
    }

    // Handshake-mode connections are authenticated on admission; with no
    // secret configured every connection is. Message mode starts
    // unauthenticated and earns the flag per frame.
    let authenticated = match state.config.auth_mode {
        AuthMode::Handshake => true,
        AuthMode::Message => !state.config.auth_enabled(),
    };

    ws.on_upgrade(move |socket| run_connection(socket, remote, authenticated, state))
}

/// Fallback for any path other than the configured one.
pub async fn invalid_path(ConnectInfo(remote): ConnectInfo<SocketAddr>) -> Response {
    tracing::warn!(%remote, "request for unexpected path");
    (StatusCode::BAD_REQUEST, "invalid path").into_response()
}

/// Checks `Authorization: Bearer <token>` against the shared secret.
/// Missing header, missing `Bearer ` prefix, and token mismatch are all
/// equivalent rejections.
fn token_matches(headers: &HeaderMap, secret: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        "invalid or missing access token",
    )
        .into_response()
}
