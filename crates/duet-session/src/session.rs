//! Session types: the server's record of one connected player identity.
//!
//! A [`SessionClient`] is created when the session socket connects and lives
//! until that socket goes away. It owns the player's identity, appearance
//! and outbound queue. The room socket attaches to it through the
//! [`RoomPresence`] trait, so this crate never depends on the room layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use duet_protocol::{ClientId, Rank, RoomId};
use duet_transport::{Cancel, ConnectionId, LinkConfig, Outbox};
use parking_lot::Mutex;

use crate::services::{GameData, Medals};

/// A boxed, sendable future, for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Limits applied to session sockets.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions one IP may hold at the same time.
    ///
    /// Default: 3.
    pub max_sessions_per_ip: usize,

    /// Capacity of each session's outbound queue.
    ///
    /// Default: 8.
    pub outbox_capacity: usize,

    /// Keepalive and write timing.
    pub link: LinkConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_ip: 3,
            outbox_capacity: 8,
            link: LinkConfig::with_pong_wait(Duration::from_secs(60)),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Who a connection belongs to, resolved from a token or an IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uuid: String,
    pub name: String,
    pub rank: Rank,
    /// Badge id, `"null"` when none is equipped.
    pub badge: String,
    /// `true` for registered accounts, `false` for IP-derived identities.
    pub account: bool,
    pub banned: bool,
    pub muted: bool,
    pub medals: Medals,
}

// ---------------------------------------------------------------------------
// RoomPresence
// ---------------------------------------------------------------------------

/// Where the bound room client stands, for location-tagged chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceLocation {
    pub map_id: String,
    pub prev_map_id: String,
    pub prev_locations: String,
    pub x: i32,
    pub y: i32,
}

/// The room connection a session is bound to, seen from the session side.
///
/// The room layer implements this. A session holds at most one presence at
/// a time; see [`SessionClient::try_bind`].
pub trait RoomPresence: Send + Sync + 'static {
    /// The room the presence currently belongs to.
    fn room_id(&self) -> RoomId;

    /// The room socket behind the presence.
    fn connection_id(&self) -> ConnectionId;

    fn location(&self) -> PresenceLocation;

    /// Tells the room the player picked a name.
    fn announce_name(&self, name: &str);

    /// Stores the previous location and runs the `prevMap` trigger.
    fn report_previous_location(
        &self,
        prev_map_id: String,
        prev_locations: String,
    ) -> BoxFuture<'_, ()>;

    /// Stores the named locations the player is in.
    fn enter_locations(&self, locations: Vec<String>);

    /// Ends the room connection.
    fn cancel(&self);
}

// ---------------------------------------------------------------------------
// SessionClient
// ---------------------------------------------------------------------------

/// Mutable per-session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Display name, empty until set.
    pub name: String,
    pub sprite: String,
    /// `-1` until the client reports a sprite.
    pub sprite_index: i32,
    pub system: String,
    pub private_mode: bool,
    pub party_id: Option<i32>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            sprite: String::new(),
            sprite_index: -1,
            system: String::new(),
            private_mode: false,
            party_id: None,
        }
    }
}

/// One connected player identity.
pub struct SessionClient {
    id: ClientId,
    ip: String,
    identity: Identity,
    profile: Mutex<Profile>,
    outbox: Outbox,
    cancel: Cancel,
    presence: Mutex<Option<Arc<dyn RoomPresence>>>,
}

impl SessionClient {
    pub fn new(
        id: ClientId,
        ip: impl Into<String>,
        identity: Identity,
        outbox: Outbox,
        cancel: Cancel,
    ) -> Self {
        let profile = Profile {
            name: identity.name.clone(),
            ..Profile::default()
        };
        Self {
            id,
            ip: ip.into(),
            identity,
            profile: Mutex::new(profile),
            outbox,
            cancel,
            presence: Mutex::new(None),
        }
    }

    // -- Identity ---------------------------------------------------------

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn uuid(&self) -> &str {
        &self.identity.uuid
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn rank(&self) -> Rank {
        self.identity.rank
    }

    pub fn badge(&self) -> &str {
        &self.identity.badge
    }

    pub fn is_account(&self) -> bool {
        self.identity.account
    }

    pub fn is_muted(&self) -> bool {
        self.identity.muted
    }

    pub fn medals(&self) -> Medals {
        self.identity.medals
    }

    // -- Profile ----------------------------------------------------------

    /// A snapshot of the mutable state.
    pub fn profile(&self) -> Profile {
        self.profile.lock().clone()
    }

    pub fn name(&self) -> String {
        self.profile.lock().name.clone()
    }

    /// Sets the name unless one is already set. Returns whether it was set.
    pub fn try_set_name(&self, name: &str) -> bool {
        let mut profile = self.profile.lock();
        if !profile.name.is_empty() {
            return false;
        }
        profile.name = name.to_string();
        true
    }

    pub fn set_sprite(&self, sprite: &str, index: i32) {
        let mut profile = self.profile.lock();
        profile.sprite = sprite.to_string();
        profile.sprite_index = index;
    }

    pub fn set_system(&self, system: &str) {
        self.profile.lock().system = system.to_string();
    }

    pub fn set_private_mode(&self, private: bool) {
        self.profile.lock().private_mode = private;
    }

    pub fn party_id(&self) -> Option<i32> {
        self.profile.lock().party_id
    }

    pub fn set_party_id(&self, party_id: Option<i32>) {
        self.profile.lock().party_id = party_id;
    }

    /// The appearance persisted between sessions.
    pub fn game_data(&self) -> GameData {
        let profile = self.profile.lock();
        GameData {
            sprite: profile.sprite.clone(),
            sprite_index: profile.sprite_index,
            system: profile.system.clone(),
        }
    }

    pub fn apply_game_data(&self, data: GameData) {
        let mut profile = self.profile.lock();
        profile.sprite = data.sprite;
        profile.sprite_index = data.sprite_index;
        profile.system = data.system;
    }

    // -- Connection -------------------------------------------------------

    /// Queues a message on the session socket. Never blocks.
    pub fn send(&self, msg: impl Into<String>) -> bool {
        self.outbox.push(msg)
    }

    /// Ends the session connection.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // -- Room presence ----------------------------------------------------

    /// Binds a room presence if none is bound yet.
    pub fn try_bind(&self, presence: Arc<dyn RoomPresence>) -> bool {
        let mut slot = self.presence.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(presence);
        true
    }

    /// Unbinds the presence if it is still the one on connection `conn`.
    pub fn unbind(&self, conn: ConnectionId) -> bool {
        let mut slot = self.presence.lock();
        match slot.as_ref() {
            Some(p) if p.connection_id() == conn => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Removes and returns the bound presence.
    pub fn take_presence(&self) -> Option<Arc<dyn RoomPresence>> {
        self.presence.lock().take()
    }

    pub fn presence(&self) -> Option<Arc<dyn RoomPresence>> {
        self.presence.lock().clone()
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("id", &self.id)
            .field("uuid", &self.identity.uuid)
            .field("ip", &self.ip)
            .finish_non_exhaustive()
    }
}
