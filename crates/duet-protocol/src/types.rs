//! Identity newtypes shared by the session and room layers.

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Dense numeric id of a connected session.
///
/// Allocated as the smallest free value in `[0, MAX)` and reused after the
/// session disconnects. This is the `id` field of every room broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u16);

impl ClientId {
    /// Exclusive upper bound of the id space.
    pub const MAX: u16 = 0xFFFF;
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A room, i.e. one game map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(pub u32);

impl RoomId {
    /// The zero-padded map id the game client uses, e.g. `0005`.
    pub fn map_id(self) -> String {
        format!("{:04}", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Rank
// ---------------------------------------------------------------------------

/// Player privilege level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(pub u8);

impl Rank {
    /// Regular player.
    pub const PLAYER: Rank = Rank(0);
    /// Moderator.
    pub const MODERATOR: Rank = Rank(1);
    /// Administrator / developer. Sees disabled content.
    pub const ADMIN: Rank = Rank(2);

    /// Returns `true` for rank 2 and above.
    pub fn is_admin(self) -> bool {
        self >= Self::ADMIN
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
