//! API layer: the dispatcher contract and its host-backed implementation.
//!
//! Inbound frames carrying an `api` field are forwarded here by the
//! message router; the result envelope is returned to the client verbatim.

pub mod dispatcher;
pub mod envelope;

pub use dispatcher::{ApiDispatcher, HostDispatcher};
pub use envelope::{ApiEnvelope, ApiStatus};
