//! Error types for the session layer.

use duet_protocol::ProtocolError;

use crate::StoreError;

/// Errors raised while admitting a session or handling one of its messages.
///
/// Admission errors (`Banned`, `TooManyConnections`, `IdSpaceExhausted`)
/// abort the connection before anything is sent. Everything else is logged
/// and the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The resolved identity is banned.
    #[error("player is banned")]
    Banned,

    /// The IP already holds the maximum number of sessions.
    #[error("too many connections from {0}")]
    TooManyConnections(String),

    /// Every client id is taken.
    #[error("no free client id")]
    IdSpaceExhausted,

    /// A room connection arrived without a live session for its identity.
    #[error("no session for player")]
    NoSession,

    /// The session is already bound to another room connection.
    #[error("session is already bound to a room")]
    SessionBusy,

    /// The message needs a bound room presence.
    #[error("session is not in a room")]
    NotInRoom,

    /// The player is not a member of a party.
    #[error("player is not in a party")]
    NotInParty,

    /// Muted players cannot chat.
    #[error("player is muted")]
    Muted,

    /// Chat text is empty or too long after trimming.
    #[error("invalid message length")]
    InvalidMessage,

    /// Names are 1 to 12 alphanumeric characters.
    #[error("invalid name {0:?}")]
    InvalidName(String),

    /// The name can only be set once per session.
    #[error("name already set")]
    NameAlreadySet,

    /// A field value is outside its accepted range.
    #[error("invalid value for `{0}`")]
    InvalidField(&'static str),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}
