//! Narrow contract to the host application.
//!
//! The gateway acts on the host (chat broadcast, private messages, raw
//! commands) and queries it for enrichment data through this trait. All
//! query methods return explicit optionals: an unreachable data source is
//! a first-class, loggable outcome, never a swallowed error. Implementors
//! are expected to answer promptly; slow lookups are already kept off the
//! host's own callback context by the event bridge.

use crate::domain::event::Coordinate;

/// Error raised by a host-side action.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The host rejected or failed to run a command.
    #[error("host rejected command: {0}")]
    Command(String),
    /// The host is not available to act right now.
    #[error("host unavailable")]
    Unavailable,
}

/// The host application seen from the gateway.
///
/// Command methods are fallible; query methods return `None` (or an empty
/// collection) when the host cannot answer.
pub trait Host: Send + Sync {
    /// Sends a chat message to every player.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the host rejects the message.
    fn broadcast(&self, message: &str) -> Result<(), HostError>;

    /// Sends a private chat message to one player.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the host rejects the message.
    fn tell(&self, player: &str, message: &str) -> Result<(), HostError>;

    /// Executes a raw host console command.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the host rejects the command.
    fn execute(&self, command: &str) -> Result<(), HostError>;

    /// Host server version, if the host can report it.
    fn server_version(&self) -> Option<String> {
        None
    }

    /// Nicknames of every online player.
    fn online_players(&self) -> Vec<String> {
        Vec::new()
    }

    /// Configured player limit, if known.
    fn max_players(&self) -> Option<u32> {
        None
    }

    /// UUID of an online player, if known.
    fn player_uuid(&self, _nickname: &str) -> Option<String> {
        None
    }

    /// Operator status of a player, if known.
    fn player_is_op(&self, _nickname: &str) -> Option<bool> {
        None
    }

    /// Host permission level of a player, if known.
    fn player_permission_level(&self, _nickname: &str) -> Option<u32> {
        None
    }

    /// Dimension a player is currently in, if known.
    fn player_dimension(&self, _nickname: &str) -> Option<String> {
        None
    }

    /// Current position of a player, if known.
    fn player_coordinate(&self, _nickname: &str) -> Option<Coordinate> {
        None
    }
}

/// Host backend that logs every action and answers no queries.
///
/// Used for standalone runs of the gateway binary and in tests where the
/// effect on the host is irrelevant.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHost;

impl Host for LoggingHost {
    fn broadcast(&self, message: &str) -> Result<(), HostError> {
        tracing::info!(message, "host broadcast");
        Ok(())
    }

    fn tell(&self, player: &str, message: &str) -> Result<(), HostError> {
        tracing::info!(player, message, "host tell");
        Ok(())
    }

    fn execute(&self, command: &str) -> Result<(), HostError> {
        tracing::info!(command, "host execute");
        Ok(())
    }
}
