//! Gateway error types.
//!
//! [`BridgeError`] covers the lifecycle-fatal conditions of the bridging
//! server. Everything recoverable (transport drops, malformed frames,
//! authentication failures, dispatcher faults) is handled at its own layer
//! and answered on the wire; only lifecycle errors reach the operator.

use std::net::SocketAddr;

/// Errors surfaced by the bridging server's lifecycle entry points.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Binding the WebSocket listener failed (port in use, bad address).
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The dedicated listener runtime could not be built.
    #[error("failed to build listener runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// The listener thread did not report readiness within the startup window.
    #[error("listener thread did not start within {0:?}")]
    StartupTimeout(std::time::Duration),

    /// The listener thread exited before reporting readiness.
    #[error("listener thread exited during startup")]
    ListenerExited,

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}
