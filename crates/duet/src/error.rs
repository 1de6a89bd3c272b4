//! Unified error type for the Duet server.

use duet_protocol::ProtocolError;
use duet_room::RoomError;
use duet_session::SessionError;
use duet_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DuetError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A malformed frame or message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session admission or message error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room admission or message error.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The config file could not be read.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for [`ServerConfig`](crate::ServerConfig).
    #[error("config parse: {0}")]
    Config(#[from] toml::de::Error),

    /// The config parsed but a value is unusable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
