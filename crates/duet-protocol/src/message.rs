//! Logical messages: splitting inbound payloads into typed fields and
//! building outbound messages.
//!
//! ```text
//! payload = message (MESSAGE_DELIM message)*
//! message = tag (FIELD_DELIM field)*
//! ```
//!
//! Both delimiters are non-characters, so they never occur in text a player
//! can type.

use std::fmt::Write as _;
use std::str::{FromStr, Split};

use crate::{ClientId, ProtocolError, Rank, RoomId};

/// Separates the fields of one message.
pub const FIELD_DELIM: char = '\u{FFFF}';

/// Separates messages coalesced into one room frame.
pub const MESSAGE_DELIM: char = '\u{FFFE}';

/// [`MESSAGE_DELIM`] as a string slice, for joining.
pub const MESSAGE_DELIM_STR: &str = "\u{FFFE}";

/// Splits a verified room payload into its messages. Empty messages are
/// skipped.
pub fn split_messages(payload: &str) -> impl Iterator<Item = Fields<'_>> {
    payload
        .split(MESSAGE_DELIM)
        .filter(|msg| !msg.is_empty())
        .map(Fields::new)
}

/// Joins raw fields into one message, the way a client encodes them.
pub fn join_fields(fields: &[&str]) -> String {
    let mut out = String::new();
    fields.write_field(&mut out);
    out
}

// ---------------------------------------------------------------------------
// Fields: inbound cursor
// ---------------------------------------------------------------------------

/// Cursor over the fields of one inbound message.
///
/// The typed accessors consume fields left to right and name the field in
/// their errors, so request parsers read like the wire layout.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    raw: &'a str,
    tag: &'a str,
    rest: Split<'a, char>,
}

impl<'a> Fields<'a> {
    /// Splits one message on [`FIELD_DELIM`].
    pub fn new(raw: &'a str) -> Self {
        let mut rest = raw.split(FIELD_DELIM);
        let tag = rest.next().unwrap_or_default();
        Self { raw, tag, rest }
    }

    /// The full message text, for access logs.
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    /// The type tag (first field).
    pub fn tag(&self) -> &'a str {
        self.tag
    }

    /// Takes the next field as text.
    pub fn next_str(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        self.rest.next().ok_or_else(|| ProtocolError::MissingField {
            tag: self.tag.to_string(),
            field,
        })
    }

    /// Takes the next field and parses it.
    pub fn next<T: FromStr>(&mut self, field: &'static str) -> Result<T, ProtocolError> {
        let value = self.next_str(field)?;
        value.parse().map_err(|_| self.malformed(field, value))
    }

    /// Takes the next field as a `0`/`1` flag.
    pub fn next_flag(&mut self, field: &'static str) -> Result<bool, ProtocolError> {
        let value = self.next_str(field)?;
        parse_flag(value).ok_or_else(|| self.malformed(field, value))
    }

    /// Like [`next_flag`](Self::next_flag), but an absent field is `None`.
    pub fn opt_flag(&mut self, field: &'static str) -> Result<Option<bool>, ProtocolError> {
        match self.rest.next() {
            None => Ok(None),
            Some(value) => parse_flag(value)
                .map(Some)
                .ok_or_else(|| self.malformed(field, value)),
        }
    }

    /// Consumes the cursor, returning every field not read yet.
    pub fn remaining(self) -> Vec<&'a str> {
        self.rest.collect()
    }

    /// Fails if any field is left unread.
    pub fn finish(mut self) -> Result<(), ProtocolError> {
        match self.rest.next() {
            None => Ok(()),
            Some(_) => Err(ProtocolError::TooManyFields {
                tag: self.tag.to_string(),
            }),
        }
    }

    fn malformed(&self, field: &'static str, value: &str) -> ProtocolError {
        ProtocolError::MalformedField {
            tag: self.tag.to_string(),
            field,
            value: value.to_string(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// OutMessage: outbound builder
// ---------------------------------------------------------------------------

/// A value that can be written as one or more outbound fields.
pub trait WireArg {
    /// Appends the field text to `out`. Multi-field values separate their
    /// parts with [`FIELD_DELIM`].
    fn write_field(&self, out: &mut String);
}

macro_rules! display_wire_arg {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireArg for $ty {
                fn write_field(&self, out: &mut String) {
                    let _ = write!(out, "{self}");
                }
            }
        )*
    };
}

display_wire_arg!(
    i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, ClientId, RoomId, Rank
);

impl WireArg for str {
    fn write_field(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl WireArg for String {
    fn write_field(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl WireArg for bool {
    fn write_field(&self, out: &mut String) {
        out.push(if *self { '1' } else { '0' });
    }
}

impl<T: WireArg> WireArg for [T] {
    fn write_field(&self, out: &mut String) {
        for (i, item) in self.iter().enumerate() {
            if i > 0 {
                out.push(FIELD_DELIM);
            }
            item.write_field(out);
        }
    }
}

impl<T: WireArg, const N: usize> WireArg for [T; N] {
    fn write_field(&self, out: &mut String) {
        self.as_slice().write_field(out);
    }
}

impl<T: WireArg + ?Sized> WireArg for &T {
    fn write_field(&self, out: &mut String) {
        (**self).write_field(out);
    }
}

/// Builder for one outbound message.
///
/// Most call sites use the [`message!`](crate::message) macro instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutMessage(String);

impl OutMessage {
    /// Starts a message with the given type tag.
    pub fn new(tag: &str) -> Self {
        Self(tag.to_string())
    }

    /// Appends a field.
    pub fn arg(mut self, value: impl WireArg) -> Self {
        self.0.push(FIELD_DELIM);
        value.write_field(&mut self.0);
        self
    }

    /// Appends a JSON-encoded field.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize + ?Sized>(
        mut self,
        value: &T,
    ) -> Result<Self, ProtocolError> {
        let encoded = serde_json::to_string(value)?;
        self.0.push(FIELD_DELIM);
        self.0.push_str(&encoded);
        Ok(self)
    }

    /// Returns the wire text.
    pub fn build(self) -> String {
        self.0
    }
}

impl From<OutMessage> for String {
    fn from(msg: OutMessage) -> Self {
        msg.0
    }
}

/// Builds an outbound message string from a tag and fields.
///
/// ```rust
/// use duet_protocol::{message, ClientId};
///
/// let msg = message!("m", ClientId(3), 10, 12);
/// assert_eq!(msg, "m\u{FFFF}3\u{FFFF}10\u{FFFF}12");
/// ```
#[macro_export]
macro_rules! message {
    ($tag:expr $(, $arg:expr)* $(,)?) => {
        $crate::OutMessage::new($tag)$(.arg($arg))*.build()
    };
}
