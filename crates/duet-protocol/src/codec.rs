//! Frame verification for the room socket and size/encoding checks for the
//! session socket.
//!
//! A room frame is an 8-byte header followed by the payload:
//!
//! ```text
//! ┌───────────┬─────────────┬──────────────────────────────┐
//! │ signature │ counter     │ payload (UTF-8, no controls) │
//! │ 4 bytes   │ u32 BE      │                              │
//! └───────────┴─────────────┴──────────────────────────────┘
//! ```
//!
//! `signature = HMAC-SHA256(secret, key_be ‖ counter_be ‖ payload)[..4]`,
//! where `secret` is the server's signing key and `key` is the
//! per-connection value from the `s` handshake. The counter must be exactly
//! one more than the last accepted frame's, so captured frames cannot be
//! replayed.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::ProtocolError;

/// Length of the signature + counter header.
pub const HEADER_LEN: usize = 8;

/// Largest frame accepted on either socket.
pub const MAX_FRAME_SIZE: usize = 4096;

/// Length of the truncated MAC at the start of a frame.
const SIGNATURE_LEN: usize = 4;

type HmacSha256 = Hmac<Sha256>;

/// MAC state over one frame. HMAC takes keys of any length, so `None` is
/// never returned in practice.
fn frame_mac(key: u32, secret: &[u8], counter: u32, payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(&key.to_be_bytes());
    mac.update(&counter.to_be_bytes());
    mac.update(payload);
    Some(mac)
}

/// Computes the 4-byte signature for `payload` sent with `counter`.
pub fn signature(key: u32, secret: &[u8], counter: u32, payload: &[u8]) -> [u8; 4] {
    let mut sig = [0; SIGNATURE_LEN];
    if let Some(mac) = frame_mac(key, secret, counter, payload) {
        sig.copy_from_slice(&mac.finalize().into_bytes()[..SIGNATURE_LEN]);
    }
    sig
}

/// Builds a frame the way a game client does: header, then payload.
pub fn sign_frame(key: u32, secret: &[u8], counter: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&signature(key, secret, counter, payload));
    frame.extend_from_slice(&counter.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Per-connection verifier for inbound room frames.
#[derive(Debug, Clone)]
pub struct FrameVerifier {
    key: u32,
    secret: Arc<[u8]>,
    counter: u32,
}

impl FrameVerifier {
    /// Creates a verifier expecting counter 1 next.
    pub fn new(key: u32, secret: Arc<[u8]>) -> Self {
        Self {
            key,
            secret,
            counter: 0,
        }
    }

    /// The connection key the signature is bound to.
    pub fn key(&self) -> u32 {
        self.key
    }

    /// The counter of the last accepted frame (0 before the first).
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Verifies `frame` and returns its payload.
    ///
    /// Checks run in order: size, signature, counter, control bytes,
    /// encoding. The counter advances only when every check passes.
    pub fn verify<'a>(&mut self, frame: &'a [u8]) -> Result<&'a str, ProtocolError> {
        if frame.len() < HEADER_LEN || frame.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::BadSize(frame.len()));
        }

        let (header, payload) = frame.split_at(HEADER_LEN);
        let (sig, counter) = header.split_at(SIGNATURE_LEN);
        let counter = u32::from_be_bytes([counter[0], counter[1], counter[2], counter[3]]);

        let signed = frame_mac(self.key, &self.secret, counter, payload)
            .is_some_and(|mac| mac.verify_truncated_left(sig).is_ok());
        if !signed {
            return Err(ProtocolError::BadSignature);
        }

        let expected = self.counter.wrapping_add(1);
        if counter != expected {
            return Err(ProtocolError::BadCounter {
                expected,
                got: counter,
            });
        }

        if payload.iter().any(|&b| b < 0x20) {
            return Err(ProtocolError::BadBytes);
        }

        let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidEncoding)?;
        self.counter = counter;
        Ok(text)
    }
}

/// Checks a session-socket frame: size limit and UTF-8.
pub fn decode_text(frame: &[u8]) -> Result<&str, ProtocolError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::BadSize(frame.len()));
    }
    std::str::from_utf8(frame).map_err(|_| ProtocolError::InvalidEncoding)
}
