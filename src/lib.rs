//! # queqiao-gateway
//!
//! WebSocket gateway bridging a synchronous game host to QueQiao
//! protocol clients.
//!
//! The host side is synchronous: lifecycle commands and game callbacks
//! arrive on plain threads. The network side is a tokio/axum WebSocket
//! server confined to one dedicated thread. This crate is the bridge
//! between the two: host events are enriched and fanned out to every
//! authenticated client, and client API frames are dispatched back into
//! host actions.
//!
//! ## Architecture
//!
//! ```text
//! Host (sync threads)
//!     │
//!     ├── AdminCommand (admin)
//!     ├── EventBridge (bridge)
//!     │
//!     ├── BridgeServer (server)      ── dedicated listener thread
//!     │       │
//!     │       ├── WS Handler (ws/)
//!     │       ├── Frame Router (ws/)
//!     │       └── ConnectionRegistry (domain/)
//!     │
//!     └── Host trait ←── HostDispatcher (api/)
//! ```

pub mod admin;
pub mod api;
pub mod app_state;
pub mod bridge;
pub mod config;
pub mod domain;
pub mod error;
pub mod host;
pub mod server;
pub mod ws;
