//! Error types for the room layer.

use duet_protocol::{ProtocolError, RoomId};
use duet_session::{SessionError, StoreError};

/// Errors that can occur while joining a room or handling a room message.
///
/// Join errors end the connection before the handshake. Message errors are
/// logged and the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// A field is outside its accepted range.
    #[error("invalid value for `{0}`")]
    InvalidValue(&'static str),

    /// `mp` named a picture slot that is empty.
    #[error("picture {0} not found")]
    PictureNotFound(i32),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}
