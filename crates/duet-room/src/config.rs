//! Room layer configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use duet_transport::LinkConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MinigameConfig
// ---------------------------------------------------------------------------

/// A minigame whose high score is tracked through a game variable.
///
/// When a player becomes valid in `room`, the server asks the client for
/// `var_id`. Reported values above the stored score are written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinigameConfig {
    /// Room the minigame lives in.
    pub room: u32,

    /// Score key in the player store.
    pub minigame_id: String,

    /// Game variable holding the score.
    pub var_id: i32,

    /// Request the variable immediately (`sv|id|2`) instead of on the next
    /// change (`sv|id|1`).
    #[serde(default)]
    pub initial_var_sync: bool,
}

// ---------------------------------------------------------------------------
// RoomsConfig
// ---------------------------------------------------------------------------

/// Settings for the room registry.
#[derive(Debug, Clone)]
pub struct RoomsConfig {
    /// Game variant name. Time-trial conditions only apply to `2kki`.
    pub game_name: String,

    /// Rooms `0..=max_room_id` are created at startup.
    pub max_room_id: u32,

    /// Rooms that never broadcast or resync.
    pub singleplayer_rooms: Vec<u32>,

    pub minigames: Vec<MinigameConfig>,

    /// Vending machine event ids offered per room.
    pub vending_machines: HashMap<u32, Vec<i32>>,

    /// Server secret mixed into every frame signature.
    pub secret: Arc<[u8]>,

    /// Capacity of each room connection's outbound queue.
    ///
    /// Default: 16.
    pub outbox_capacity: usize,

    /// Keepalive and write timing.
    pub link: LinkConfig,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            game_name: String::new(),
            max_room_id: 0,
            singleplayer_rooms: Vec::new(),
            minigames: Vec::new(),
            vending_machines: HashMap::new(),
            secret: Arc::from(&b""[..]),
            outbox_capacity: 16,
            link: LinkConfig::with_pong_wait(Duration::from_secs(60)),
        }
    }
}
