//! Collaborator interfaces the session and room layers call into.
//!
//! Duet does not own persistence, social features or event bookkeeping.
//! It consumes them through three traits:
//!
//! - [`PlayerStore`]: accounts, bans, mutes, names, tags, scores, game data
//! - [`SocialGraph`]: friends and parties
//! - [`EventBoard`]: event periods, expeditions, vending machines
//!
//! A deployment implements all three on one type, which then satisfies
//! [`Services`] automatically. [`MemoryServices`](crate::MemoryServices)
//! is the in-process implementation used by tests and the stand-alone
//! binary.

use std::future::Future;

use duet_protocol::Rank;
use serde::Serialize;

/// Errors reported by a collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The backing service failed.
    #[error("storage backend failed: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A registered account resolved from a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uuid: String,
    pub name: String,
    pub rank: Rank,
    /// Badge id, or empty when none is equipped.
    pub badge: String,
    pub banned: bool,
    pub muted: bool,
}

/// An IP-derived anonymous identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousPlayer {
    pub uuid: String,
    pub banned: bool,
    pub muted: bool,
}

/// Appearance persisted between sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameData {
    pub sprite: String,
    /// `-1` until the client reports a sprite.
    pub sprite_index: i32,
    pub system: String,
}

impl Default for GameData {
    fn default() -> Self {
        Self {
            sprite: String::new(),
            sprite_index: -1,
            system: String::new(),
        }
    }
}

/// Medal counts, bronze through diamond.
pub type Medals = [i32; 5];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub uuid: String,
    pub name: String,
    pub rank: u8,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyMember {
    pub uuid: String,
    pub name: String,
    pub rank: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: i32,
    pub name: String,
    pub owner_uuid: String,
    pub members: Vec<PartyMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPeriod {
    pub period_ordinal: i32,
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLocation {
    pub id: String,
    pub title: String,
    pub depth: i32,
    pub exp: i32,
    pub complete: bool,
}

/// The vending machine expedition currently running, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendingMachine {
    pub map_id: u32,
    pub event_id: i32,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Player persistence.
pub trait PlayerStore: Send + Sync + 'static {
    /// Looks up the account behind a session token. `None` if the token is
    /// unknown.
    fn account_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<Account>, StoreError>> + Send;

    /// Gets or creates the anonymous identity for an IP.
    fn anonymous_by_ip(&self, ip: &str) -> impl Future<Output = Result<AnonymousPlayer, StoreError>> + Send;

    fn medals(&self, uuid: &str) -> impl Future<Output = Result<Medals, StoreError>> + Send;

    fn game_data(&self, uuid: &str) -> impl Future<Output = Result<GameData, StoreError>> + Send;

    fn save_game_data(
        &self,
        uuid: &str,
        data: &GameData,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The party the player belongs to, if any.
    fn party_id(&self, uuid: &str) -> impl Future<Output = Result<Option<i32>, StoreError>> + Send;

    fn set_name(&self, uuid: &str, name: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn set_private_mode(
        &self,
        uuid: &str,
        private: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Records that the player did something, for presence tracking.
    fn mark_game_activity(&self, uuid: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn player_tags(&self, uuid: &str) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Stores a tag. Returns `true` if the player did not have it yet.
    fn try_write_tag(
        &self,
        uuid: &str,
        tag: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn minigame_score(
        &self,
        uuid: &str,
        minigame_id: &str,
    ) -> impl Future<Output = Result<i32, StoreError>> + Send;

    fn write_minigame_score(
        &self,
        uuid: &str,
        minigame_id: &str,
        score: i32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn save_location_colors(
        &self,
        location: &str,
        fg_color: &str,
        bg_color: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Friends and parties.
pub trait SocialGraph: Send + Sync + 'static {
    fn friends(&self, uuid: &str) -> impl Future<Output = Result<Vec<Friend>, StoreError>> + Send;

    fn party(&self, party_id: i32) -> impl Future<Output = Result<Party, StoreError>> + Send;
}

/// Event and expedition bookkeeping.
pub trait EventBoard: Send + Sync + 'static {
    fn current_period(&self) -> impl Future<Output = Result<EventPeriod, StoreError>> + Send;

    fn event_locations(
        &self,
        uuid: &str,
    ) -> impl Future<Output = Result<Vec<EventLocation>, StoreError>> + Send;

    /// Expedition points of the current period.
    fn exp(&self, uuid: &str) -> impl Future<Output = Result<i32, StoreError>> + Send;

    /// Claims an expedition. Returns the client-facing result code.
    fn claim(&self, uuid: &str, event_id: &str) -> impl Future<Output = Result<i32, StoreError>> + Send;

    /// Completes every event location among `locations`. Returns the
    /// points gained.
    fn complete_locations(
        &self,
        uuid: &str,
        locations: &[String],
    ) -> impl Future<Output = Result<i32, StoreError>> + Send;

    fn complete_event_action(
        &self,
        uuid: &str,
        event_id: i32,
        action: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn vending_machine(
        &self,
    ) -> impl Future<Output = Result<Option<VendingMachine>, StoreError>> + Send;
}

/// Everything the session and room layers need from the outside world.
pub trait Services: PlayerStore + SocialGraph + EventBoard {}

impl<T: PlayerStore + SocialGraph + EventBoard> Services for T {}
