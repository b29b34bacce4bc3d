//! Bridging server lifecycle.
//!
//! [`BridgeServer`] owns the WebSocket listener and the dedicated thread
//! that runs it. The thread hosts a single current-thread tokio runtime:
//! that runtime is the only context that accepts connections and mutates
//! the registry, which keeps the synchronous host side free of network
//! I/O. `start` and `stop` are the two cross-context touch points; both
//! are serialized on one mutex and bounded in time, so an unresponsive
//! listener can never deadlock the caller.
//!
//! State machine per cycle:
//! `Stopped → Starting → Running → Stopping → Stopped`, with `start` and
//! `stop` as logged no-ops outside their valid source states.

use std::fmt;
use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::get;
use tokio::runtime;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::api::ApiDispatcher;
use crate::app_state::AppState;
use crate::config::BridgeConfig;
use crate::domain::ConnectionRegistry;
use crate::error::BridgeError;
use crate::ws::handler::{invalid_path, ws_handler};

/// Grace period for in-flight blocking tasks when the listener runtime
/// shuts down.
const RUNTIME_DRAIN: Duration = Duration::from_secs(2);

/// Externally observable lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No listener exists.
    Stopped,
    /// `start` is binding the listener.
    Starting,
    /// The listener accepts connections.
    Running,
    /// `stop` is tearing the listener down; broadcasts are dropped.
    Stopping,
}

/// Handles owned while the listener is up.
struct ListenerWorker {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    listener_closed: std_mpsc::Receiver<()>,
    exited: std_mpsc::Receiver<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Debug for ListenerWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerWorker")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

/// The bridging server: one instance per process.
///
/// Creating a second instance compiles, but only one can own a given
/// listen address; starting while already Running is a logged no-op.
pub struct BridgeServer {
    config: Mutex<Arc<BridgeConfig>>,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<dyn ApiDispatcher>,
    state: Mutex<LifecycleState>,
    /// Hot accessor for the event bridge; cleared before `stop` begins
    /// its bounded waits so host callbacks are never blocked by them.
    handle: Mutex<Option<runtime::Handle>>,
    /// Serializes `start`/`stop`; held across their bounded waits.
    worker: Mutex<Option<ListenerWorker>>,
}

impl fmt::Debug for BridgeServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeServer")
            .field("state", &self.state())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

impl BridgeServer {
    /// Creates a stopped server around the given configuration and
    /// dispatcher.
    #[must_use]
    pub fn new(config: BridgeConfig, dispatcher: Arc<dyn ApiDispatcher>) -> Self {
        Self {
            config: Mutex::new(Arc::new(config)),
            registry: Arc::new(ConnectionRegistry::new()),
            dispatcher,
            state: Mutex::new(LifecycleState::Stopped),
            handle: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        *Self::lock(&self.state) = state;
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *Self::lock(&self.state)
    }

    /// `true` while the listener accepts connections.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    /// Address the listener is bound to, while Running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        Self::lock(&self.worker).as_ref().map(|w| w.local_addr)
    }

    /// The connection registry (fan-out entry point).
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Configuration the next `start` will use.
    #[must_use]
    pub fn config(&self) -> Arc<BridgeConfig> {
        Arc::clone(&Self::lock(&self.config))
    }

    /// Handle of the listener runtime, while Running. Used by the event
    /// bridge to schedule enrichment and fan-out off the host context.
    #[must_use]
    pub fn runtime_handle(&self) -> Option<runtime::Handle> {
        Self::lock(&self.handle).clone()
    }

    /// Re-reads configuration from the environment. A running listener
    /// keeps its current address until the next stop/start cycle.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the environment holds
    /// unparseable values.
    pub fn reload_config(&self) -> Result<(), BridgeError> {
        let config = BridgeConfig::from_env()?;
        *Self::lock(&self.config) = Arc::new(config);
        tracing::info!("configuration reloaded; applies on next start");
        Ok(())
    }

    /// Starts the listener.
    ///
    /// A logged no-op when already Running. On bind or runtime failure
    /// the error is logged, the state returns to Stopped and no retry is
    /// attempted.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] when the listener cannot be brought up.
    pub fn start(&self) -> Result<SocketAddr, BridgeError> {
        let mut worker_slot = Self::lock(&self.worker);
        if let Some(worker) = worker_slot.as_ref()
            && self.is_running()
        {
            tracing::info!(addr = %worker.local_addr, "websocket server already running");
            return Ok(worker.local_addr);
        }
        self.set_state(LifecycleState::Starting);

        let config = self.config();
        let state = AppState {
            registry: Arc::clone(&self.registry),
            dispatcher: Arc::clone(&self.dispatcher),
            config: Arc::clone(&config),
        };

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (closed_tx, closed_rx) = std_mpsc::channel();
        let (exit_tx, exit_rx) = std_mpsc::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listen_addr = config.listen_addr;
        let ws_path = config.ws_path.clone();
        let spawned = thread::Builder::new()
            .name("queqiao-ws".to_string())
            .spawn(move || {
                listener_thread(listen_addr, ws_path, state, ready_tx, closed_tx, exit_tx, shutdown_rx);
            });
        let thread_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.set_state(LifecycleState::Stopped);
                return Err(BridgeError::Runtime(e));
            }
        };

        match ready_rx.recv_timeout(config.startup_timeout) {
            Ok(Ok((local_addr, handle))) => {
                *Self::lock(&self.handle) = Some(handle);
                *worker_slot = Some(ListenerWorker {
                    local_addr,
                    shutdown: shutdown_tx,
                    listener_closed: closed_rx,
                    exited: exit_rx,
                    thread: Some(thread_handle),
                });
                self.set_state(LifecycleState::Running);
                tracing::info!(addr = %local_addr, path = %config.ws_path, "websocket server started");
                Ok(local_addr)
            }
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                self.set_state(LifecycleState::Stopped);
                tracing::error!(error = %e, "failed to start websocket server");
                Err(e)
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                self.set_state(LifecycleState::Stopped);
                tracing::error!("listener thread did not report readiness in time");
                Err(BridgeError::StartupTimeout(config.startup_timeout))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                let _ = thread_handle.join();
                self.set_state(LifecycleState::Stopped);
                tracing::error!("listener thread exited during startup");
                Err(BridgeError::ListenerExited)
            }
        }
    }

    /// Stops the listener, returning within roughly `timeout`.
    ///
    /// A logged no-op when not Running. Every connection receives a
    /// `1001` close with reason "server shutting down"; the registry is
    /// cleared; then the listener and its thread are each awaited against
    /// the shared deadline. On timeout a warning is logged and all
    /// server-owned references are force-cleared; the thread may keep
    /// winding down in the background, which is an accepted degradation.
    pub fn stop(&self, timeout: Duration) {
        let mut worker_slot = Self::lock(&self.worker);
        if !self.is_running() {
            tracing::debug!("websocket server not running");
            return;
        }
        self.set_state(LifecycleState::Stopping);
        *Self::lock(&self.handle) = None;
        tracing::info!("stopping websocket server");

        let Some(mut worker) = worker_slot.take() else {
            self.set_state(LifecycleState::Stopped);
            return;
        };

        let unreachable = self.registry.close_all();
        if unreachable > 0 {
            tracing::debug!(unreachable, "connections already gone during shutdown");
        }
        self.registry.clear();

        let deadline = Instant::now() + timeout;
        let _ = worker.shutdown.send(true);

        if worker.listener_closed.recv_timeout(remaining(deadline)).is_err() {
            tracing::warn!("timed out waiting for listener to release its port");
        }
        match worker.exited.recv_timeout(remaining(deadline)) {
            Ok(()) => {
                if let Some(thread_handle) = worker.thread.take() {
                    let _ = thread_handle.join();
                }
            }
            Err(_) => {
                tracing::warn!(
                    "listener thread did not exit in time; leaving it to finish in the background"
                );
            }
        }

        // A connection admitted between the first clear and the listener
        // winding down would otherwise survive the stop.
        self.registry.close_all();
        self.registry.clear();

        self.set_state(LifecycleState::Stopped);
        tracing::info!("websocket server stopped");
    }
}

/// Time left until `deadline`, zero once passed.
fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Body of the dedicated listener thread: builds the runtime, binds the
/// listener, reports readiness, serves until shut down, then signals
/// port release and thread exit in that order.
fn listener_thread(
    addr: SocketAddr,
    ws_path: String,
    state: AppState,
    ready_tx: std_mpsc::Sender<Result<(SocketAddr, runtime::Handle), BridgeError>>,
    closed_tx: std_mpsc::Sender<()>,
    exit_tx: std_mpsc::Sender<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let rt = match runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready_tx.send(Err(BridgeError::Runtime(e)));
            return;
        }
    };

    rt.block_on(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = ready_tx.send(Err(BridgeError::Bind { addr, source: e }));
                return;
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(e) => {
                let _ = ready_tx.send(Err(BridgeError::Runtime(e)));
                return;
            }
        };

        let app = Router::new()
            .route(&ws_path, get(ws_handler))
            .fallback(invalid_path)
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let _ = ready_tx.send(Ok((local_addr, runtime::Handle::current())));

        let serve = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "listener loop failed");
        }
    });

    // The listener socket is released once block_on returns.
    let _ = closed_tx.send(());
    rt.shutdown_timeout(RUNTIME_DRAIN);
    let _ = exit_tx.send(());
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::Value;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message};

    use super::*;
    use crate::api::HostDispatcher;
    use crate::config::AuthMode;
    use crate::host::LoggingHost;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..BridgeConfig::default()
        }
    }

    fn test_server(config: BridgeConfig) -> BridgeServer {
        let dispatcher = Arc::new(HostDispatcher::new(Arc::new(LoggingHost)));
        BridgeServer::new(config, dispatcher)
    }

    fn client_rt() -> runtime::Runtime {
        runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    /// Polls `predicate` for up to two seconds.
    fn eventually(predicate: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn start_stop_round_trip() {
        let server = test_server(test_config());
        assert!(!server.is_running());

        let addr = server.start().unwrap();
        assert!(server.is_running());
        assert_eq!(server.local_addr(), Some(addr));
        assert_eq!(server.state(), LifecycleState::Running);

        server.stop(Duration::from_secs(5));
        assert!(!server.is_running());
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.state(), LifecycleState::Stopped);
    }

    #[test]
    fn start_twice_keeps_one_listener() {
        let server = test_server(test_config());
        let first = server.start().unwrap();
        let second = server.start().unwrap();
        assert_eq!(first, second);
        assert!(server.is_running());
        server.stop(Duration::from_secs(5));
    }

    #[test]
    fn stop_when_not_running_is_noop() {
        let server = test_server(test_config());
        server.stop(Duration::from_secs(1));
        assert!(!server.is_running());
    }

    #[test]
    fn bind_failure_leaves_server_stopped() {
        let first = test_server(test_config());
        let addr = first.start().unwrap();

        let mut config = test_config();
        config.listen_addr = addr;
        config.startup_timeout = Duration::from_secs(5);
        let second = test_server(config);
        let result = second.start();
        assert!(matches!(result, Err(BridgeError::Bind { .. })));
        assert_eq!(second.state(), LifecycleState::Stopped);

        first.stop(Duration::from_secs(5));
    }

    #[test]
    fn server_can_restart_after_stop() {
        let server = test_server(test_config());
        let first = server.start().unwrap();
        server.stop(Duration::from_secs(5));
        let second = server.start().unwrap();
        assert!(server.is_running());
        assert_ne!(first.port(), 0);
        assert_ne!(second.port(), 0);
        server.stop(Duration::from_secs(5));
    }

    #[test]
    fn ping_answers_pong_over_the_wire() {
        let server = test_server(test_config());
        let addr = server.start().unwrap();

        client_rt().block_on(async {
            let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
                .await
                .unwrap();
            ws.send(Message::text(r#"{"type":"ping"}"#)).await.unwrap();
            let Some(Ok(Message::Text(reply))) = ws.next().await else {
                panic!("expected text reply");
            };
            let value: Value = serde_json::from_str(reply.as_str()).unwrap();
            assert_eq!(value["type"], "pong");
            assert_eq!(value["message"], "pong");
            assert!(value["timestamp"].as_f64().is_some());
        });

        server.stop(Duration::from_secs(5));
    }

    #[test]
    fn malformed_frame_gets_error_and_connection_survives() {
        let server = test_server(test_config());
        let addr = server.start().unwrap();

        client_rt().block_on(async {
            let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
                .await
                .unwrap();
            ws.send(Message::text("{not json")).await.unwrap();
            let Some(Ok(Message::Text(reply))) = ws.next().await else {
                panic!("expected text reply");
            };
            let value: Value = serde_json::from_str(reply.as_str()).unwrap();
            assert_eq!(value["type"], "error");

            ws.send(Message::text(r#"{"type":"ping"}"#)).await.unwrap();
            let Some(Ok(Message::Text(reply))) = ws.next().await else {
                panic!("expected text reply");
            };
            let value: Value = serde_json::from_str(reply.as_str()).unwrap();
            assert_eq!(value["type"], "pong");
        });

        server.stop(Duration::from_secs(5));
    }

    #[test]
    fn handshake_without_token_is_rejected_before_registration() {
        let mut config = test_config();
        config.access_token = "S".to_string();
        let server = test_server(config);
        let addr = server.start().unwrap();

        client_rt().block_on(async {
            let result = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await;
            let Err(WsError::Http(response)) = result else {
                panic!("expected HTTP rejection");
            };
            assert_eq!(response.status().as_u16(), 401);
            assert_eq!(
                response
                    .headers()
                    .get("www-authenticate")
                    .and_then(|v| v.to_str().ok()),
                Some("Bearer")
            );
        });

        assert_eq!(server.connection_count(), 0);
        server.stop(Duration::from_secs(5));
    }

    #[test]
    fn handshake_with_bearer_token_is_admitted_as_authenticated() {
        let mut config = test_config();
        config.access_token = "S".to_string();
        let server = test_server(config);
        let addr = server.start().unwrap();

        client_rt().block_on(async {
            let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
            request
                .headers_mut()
                .insert("Authorization", "Bearer S".parse().unwrap());
            let (ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();

            assert!(eventually(|| server.registry().authenticated_count() == 1));
            drop(ws);
        });

        server.stop(Duration::from_secs(5));
    }

    #[test]
    fn wrong_path_is_rejected_with_bad_request() {
        let server = test_server(test_config());
        let addr = server.start().unwrap();

        client_rt().block_on(async {
            let result = tokio_tungstenite::connect_async(format!("ws://{addr}/nope")).await;
            let Err(WsError::Http(response)) = result else {
                panic!("expected HTTP rejection");
            };
            assert_eq!(response.status().as_u16(), 400);
        });

        server.stop(Duration::from_secs(5));
    }

    #[test]
    fn message_mode_admits_without_header() {
        let mut config = test_config();
        config.access_token = "S".to_string();
        config.auth_mode = AuthMode::Message;
        let server = test_server(config);
        let addr = server.start().unwrap();

        client_rt().block_on(async {
            let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
                .await
                .unwrap();
            assert!(eventually(|| server.connection_count() == 1));
            assert_eq!(server.registry().authenticated_count(), 0);

            // First valid token authenticates the connection.
            ws.send(Message::text(r#"{"type":"ping","access_token":"S"}"#))
                .await
                .unwrap();
            let Some(Ok(Message::Text(reply))) = ws.next().await else {
                panic!("expected text reply");
            };
            let value: Value = serde_json::from_str(reply.as_str()).unwrap();
            assert_eq!(value["type"], "pong");
            assert!(eventually(|| server.registry().authenticated_count() == 1));
        });

        server.stop(Duration::from_secs(5));
    }

    #[test]
    fn broadcast_reaches_every_connected_client() {
        let server = test_server(test_config());
        let addr = server.start().unwrap();

        client_rt().block_on(async {
            let (mut a, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
                .await
                .unwrap();
            let (mut b, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
                .await
                .unwrap();
            assert!(eventually(|| server.connection_count() == 2));

            let delivered = server
                .registry()
                .broadcast(&serde_json::json!({"event_name": "MCDRJoin"}));
            assert_eq!(delivered, 2);

            for ws in [&mut a, &mut b] {
                let Some(Ok(Message::Text(event))) = ws.next().await else {
                    panic!("expected broadcast frame");
                };
                let value: Value = serde_json::from_str(event.as_str()).unwrap();
                assert_eq!(value["event_name"], "MCDRJoin");
            }
        });

        server.stop(Duration::from_secs(5));
    }

    #[test]
    fn stop_clears_clients_admitted_during_shutdown() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let server = test_server(test_config());
        let addr = server.start().unwrap();

        // Keep admitting fresh connections while the stop runs; whatever
        // lands inside the shutdown window must not survive it.
        let done = Arc::new(AtomicBool::new(false));
        let connector = {
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let rt = client_rt();
                rt.block_on(async {
                    let mut held = Vec::new();
                    while !done.load(Ordering::Relaxed) {
                        match tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await {
                            Ok((ws, _)) => held.push(ws),
                            Err(_) => break,
                        }
                    }
                });
            })
        };
        assert!(eventually(|| server.connection_count() > 0));

        server.stop(Duration::from_secs(3));
        done.store(true, Ordering::Relaxed);
        let _ = connector.join();

        assert!(!server.is_running());
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn stop_is_bounded_and_closes_clients() {
        let server = test_server(test_config());
        let addr = server.start().unwrap();

        let rt = client_rt();
        let mut ws = rt.block_on(async {
            let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
                .await
                .unwrap();
            ws
        });
        assert!(eventually(|| server.connection_count() == 1));

        let started = Instant::now();
        server.stop(Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!server.is_running());
        assert_eq!(server.connection_count(), 0);

        rt.block_on(async {
            // The client observes the 1001 close (or stream end).
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        });
    }
}
