//! Shared application state injected into the WebSocket handlers.

use std::fmt;
use std::sync::Arc;

use crate::api::ApiDispatcher;
use crate::config::BridgeConfig;
use crate::domain::ConnectionRegistry;

/// Shared state available to the upgrade handler and connection tasks
/// via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Live connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Dispatcher for `api` frames.
    pub dispatcher: Arc<dyn ApiDispatcher>,
    /// Configuration the listener was started with.
    pub config: Arc<BridgeConfig>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
