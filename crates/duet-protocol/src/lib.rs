//! Wire protocol for Duet.
//!
//! This crate defines the language the game client and server speak on the
//! two sockets:
//!
//! - **Codec** ([`FrameVerifier`], [`sign_frame`], [`decode_text`]): turns
//!   raw room frames into verified payload text.
//! - **Messages** ([`Fields`], [`OutMessage`], [`message!`]): splitting
//!   payloads into fields and joining outbound fields.
//! - **Requests** ([`RoomRequest`], [`SessionRequest`]): the closed set of
//!   messages each socket accepts.
//! - **Errors** ([`ProtocolError`]): everything that can be wrong with a
//!   frame or message. None of it closes the connection.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (verified text → requests) → Session / Room
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod message;
mod room;
mod session;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{
    decode_text, sign_frame, signature, FrameVerifier, HEADER_LEN, MAX_FRAME_SIZE,
};
pub use error::ProtocolError;
pub use message::{
    join_fields, split_messages, Fields, OutMessage, WireArg, FIELD_DELIM, MESSAGE_DELIM,
    MESSAGE_DELIM_STR,
};
pub use room::{PictureParams, RoomRequest};
pub use session::SessionRequest;
pub use types::{ClientId, Rank, RoomId};
