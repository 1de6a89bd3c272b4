//! Error types for the protocol layer.
//!
//! Every variant is per-message and non-fatal: callers log it and keep the
//! connection open.

/// Errors raised while verifying frames or parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame shorter than the header or longer than the size limit.
    #[error("bad request size: {0} bytes")]
    BadSize(usize),

    /// The header signature does not match the payload.
    #[error("bad signature")]
    BadSignature,

    /// The header counter is not the next expected value.
    #[error("bad counter: expected {expected}, got {got}")]
    BadCounter {
        /// The value the frame had to carry.
        expected: u32,
        /// The value it actually carried.
        got: u32,
    },

    /// The payload contains a control character.
    #[error("bad byte sequence")]
    BadBytes,

    /// The payload is not valid UTF-8.
    #[error("invalid UTF-8")]
    InvalidEncoding,

    /// The type tag is not part of the message set.
    #[error("unknown message type: {0:?}")]
    UnknownMessageType(String),

    /// A required field is absent.
    #[error("{tag}: missing field `{field}`")]
    MissingField {
        /// Message type tag.
        tag: String,
        /// Name of the absent field.
        field: &'static str,
    },

    /// A field could not be parsed.
    #[error("{tag}: malformed field `{field}`: {value:?}")]
    MalformedField {
        /// Message type tag.
        tag: String,
        /// Name of the offending field.
        field: &'static str,
        /// The raw field text.
        value: String,
    },

    /// More fields than the message type takes.
    #[error("{tag}: too many fields")]
    TooManyFields {
        /// Message type tag.
        tag: String,
    },

    /// A room message other than `ident` arrived before identification.
    #[error("{0:?} received before ident")]
    NotIdentified(String),

    /// A JSON field could not be serialized.
    #[cfg(feature = "json")]
    #[error("json encode failed: {0}")]
    Json(#[from] serde_json::Error),
}
