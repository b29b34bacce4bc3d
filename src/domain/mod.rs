//! Domain layer: connection identity, event envelopes, and the registry.
//!
//! This module contains the bridging server's core model: the typed
//! QueQiao event envelope, the registry of live connections, and the
//! broadcast fan-out over it.

pub mod connection_id;
pub mod event;
pub mod registry;

pub use connection_id::ConnectionId;
pub use event::{Coordinate, EventEnvelope, PlayerData, PostType, SubType};
pub use registry::{ConnectionHandle, ConnectionRegistry};
