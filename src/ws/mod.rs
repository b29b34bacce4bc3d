//! WebSocket layer: upgrade handling, the per-connection loop, and
//! inbound frame routing.
//!
//! The single WebSocket endpoint at the configured path is the only
//! route the gateway serves; every other path is answered with
//! `400 Bad Request`.

pub mod connection;
pub mod handler;
pub mod router;
