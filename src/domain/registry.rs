//! Connection registry and broadcast fan-out.
//!
//! The registry owns one [`ConnectionHandle`] per live WebSocket client.
//! Connection tasks add and remove their own entries; the fan-out path
//! only clones outbound senders, so a broadcast never blocks and can be
//! issued from any thread, including the synchronous host context.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, close_code};
use serde::Serialize;
use tokio::sync::mpsc;

use super::ConnectionId;

/// Close reason sent to every client on server shutdown.
const SHUTDOWN_REASON: &str = "server shutting down";

/// Registry entry for one admitted WebSocket connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Connection identity.
    pub id: ConnectionId,
    /// Remote peer address.
    pub remote_addr: SocketAddr,
    /// Whether the client has proven the shared secret. Handshake-mode
    /// connections are admitted with this already set; message-mode
    /// connections earn it with their first valid `access_token`.
    pub authenticated: bool,
    /// Outbound channel into the connection's write loop.
    tx: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    /// Creates a handle around the outbound sender of a connection task.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        authenticated: bool,
        tx: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            authenticated,
            tx,
        }
    }

    /// Queues a message for delivery; `false` if the connection task is gone.
    fn send(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Tracks live and authenticated connections.
///
/// All structural mutation happens from connection tasks on the listener
/// runtime; [`ConnectionRegistry::broadcast`] and the count accessors are
/// safe from any thread.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a connection.
    pub fn add(&self, handle: ConnectionHandle) {
        let id = handle.id;
        let remote = handle.remote_addr;
        let count = {
            let mut guard = self.write();
            guard.insert(id, handle);
            guard.len()
        };
        tracing::info!(connection = %id, remote = %remote, connections = count, "client connected");
    }

    /// Removes a connection after its close handling, by any cause.
    pub fn remove(&self, id: ConnectionId) {
        let count = {
            let mut guard = self.write();
            if guard.remove(&id).is_none() {
                return;
            }
            guard.len()
        };
        tracing::info!(connection = %id, connections = count, "client disconnected");
    }

    /// Marks a connection authenticated (message-mode token accepted).
    /// Returns `false` if the connection is no longer registered.
    pub fn mark_authenticated(&self, id: ConnectionId) -> bool {
        let mut guard = self.write();
        match guard.get_mut(&id) {
            Some(handle) => {
                handle.authenticated = true;
                true
            }
            None => false,
        }
    }

    /// Number of registered connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Number of authenticated connections (always ≤ [`Self::count`]).
    #[must_use]
    pub fn authenticated_count(&self) -> usize {
        self.read().values().filter(|h| h.authenticated).count()
    }

    /// Serializes `event` once and queues it on every authenticated
    /// connection. Best-effort: a closed connection is skipped with a
    /// debug log and left for its own close handling to reconcile.
    ///
    /// Returns the number of connections the event was queued on. When
    /// no connection is authenticated nothing is serialized.
    pub fn broadcast<T: Serialize>(&self, event: &T) -> usize {
        let targets: Vec<(ConnectionId, mpsc::UnboundedSender<Message>)> = self
            .read()
            .values()
            .filter(|h| h.authenticated)
            .map(|h| (h.id, h.tx.clone()))
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize broadcast event");
                return 0;
            }
        };

        let mut delivered = 0;
        for (id, tx) in targets {
            if tx.send(Message::text(text.clone())).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(connection = %id, "broadcast skipped closing connection");
            }
        }
        tracing::debug!(delivered, "event broadcast");
        delivered
    }

    /// Queues a `1001 Going Away` close frame on every connection,
    /// collecting failures without aborting the batch. Returns the number
    /// of connections that could not be reached.
    pub fn close_all(&self) -> usize {
        let guard = self.read();
        let mut failures = 0;
        for handle in guard.values() {
            let frame = CloseFrame {
                code: close_code::AWAY,
                reason: Utf8Bytes::from_static(SHUTDOWN_REASON),
            };
            if !handle.send(Message::Close(Some(frame))) {
                failures += 1;
            }
        }
        failures
    }

    /// Drops every registered handle.
    pub fn clear(&self) {
        self.write().clear();
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn handle(
        authenticated: bool,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let Ok(addr) = "127.0.0.1:45000".parse::<SocketAddr>() else {
            panic!("addr parse failed");
        };
        (
            ConnectionHandle::new(ConnectionId::new(), addr, authenticated, tx),
            rx,
        )
    }

    #[test]
    fn add_remove_tracks_count() {
        let registry = ConnectionRegistry::new();
        let (h, _rx) = handle(true);
        let id = h.id;
        registry.add(h);
        assert_eq!(registry.count(), 1);
        registry.remove(id);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.remove(ConnectionId::new());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn authenticated_is_subset_of_registered() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = handle(true);
        let (b, _rx_b) = handle(false);
        registry.add(a);
        registry.add(b);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.authenticated_count(), 1);
    }

    #[test]
    fn mark_authenticated_flips_flag() {
        let registry = ConnectionRegistry::new();
        let (h, _rx) = handle(false);
        let id = h.id;
        registry.add(h);
        assert_eq!(registry.authenticated_count(), 0);
        assert!(registry.mark_authenticated(id));
        assert_eq!(registry.authenticated_count(), 1);
        assert!(!registry.mark_authenticated(ConnectionId::new()));
    }

    #[test]
    fn broadcast_skips_unauthenticated() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = handle(true);
        let (b, mut rx_b) = handle(false);
        registry.add(a);
        registry.add(b);

        let delivered = registry.broadcast(&serde_json::json!({"k": "v"}));
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn broadcast_with_no_authenticated_is_noop() {
        let registry = ConnectionRegistry::new();
        let (h, mut rx) = handle(false);
        registry.add(h);
        assert_eq!(registry.broadcast(&serde_json::json!({"k": "v"})), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_isolates_closed_connection() {
        // Three authenticated connections, one already closed: the other
        // two still receive the event and nothing panics.
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = handle(true);
        let (b, rx_b) = handle(true);
        let (c, mut rx_c) = handle(true);
        registry.add(a);
        registry.add(b);
        registry.add(c);
        drop(rx_b);

        let delivered = registry.broadcast(&serde_json::json!({"event": "x"}));
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[test]
    fn close_all_sends_close_frames_and_counts_failures() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = handle(true);
        let (b, rx_b) = handle(false);
        registry.add(a);
        registry.add(b);
        drop(rx_b);

        assert_eq!(registry.close_all(), 1);
        let Ok(Message::Close(Some(frame))) = rx_a.try_recv() else {
            panic!("expected close frame");
        };
        assert_eq!(frame.code, close_code::AWAY);
        assert_eq!(frame.reason.as_str(), "server shutting down");

        registry.clear();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn broadcast_payload_is_the_serialized_event() {
        let registry = ConnectionRegistry::new();
        let (h, mut rx) = handle(true);
        registry.add(h);

        registry.broadcast(&serde_json::json!({"event_name": "MCDRJoin"}));
        let Ok(Message::Text(text)) = rx.try_recv() else {
            panic!("expected text frame");
        };
        let parsed: serde_json::Value = serde_json::from_str(text.as_str()).unwrap_or_default();
        assert_eq!(parsed["event_name"], "MCDRJoin");
    }
}
