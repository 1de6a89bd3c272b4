//! In-process implementation of every collaborator trait.
//!
//! [`MemoryServices`] keeps all records in one mutex-guarded map set. It
//! lets the server run without external services and gives tests a backend
//! they can seed and inspect. Individual operations can be made to fail
//! with [`MemoryServices::fail`].

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use rand::Rng;

use crate::services::{
    Account, AnonymousPlayer, EventBoard, EventLocation, EventPeriod, Friend, GameData, Medals,
    Party, PlayerStore, SocialGraph, StoreError, VendingMachine,
};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    anonymous: HashMap<String, AnonymousPlayer>,
    banned_ips: HashSet<String>,
    medals: HashMap<String, Medals>,
    game_data: HashMap<String, GameData>,
    names: HashMap<String, String>,
    private_mode: HashMap<String, bool>,
    activity: HashMap<String, u32>,
    tags: HashMap<String, Vec<String>>,
    scores: HashMap<(String, String), i32>,
    location_colors: HashMap<String, (String, String)>,
    friends: HashMap<String, Vec<Friend>>,
    parties: HashMap<i32, Party>,
    period: Option<EventPeriod>,
    event_locations: Vec<EventLocation>,
    completed: HashMap<String, HashSet<String>>,
    claimed: HashSet<(String, String)>,
    exp: HashMap<String, i32>,
    event_actions: Vec<(String, i32, bool)>,
    vending_machine: Option<VendingMachine>,
    failing: HashSet<&'static str>,
}

impl State {
    fn check(&self, op: &'static str) -> Result<(), StoreError> {
        if self.failing.contains(op) {
            return Err(StoreError::Backend(format!("{op} unavailable")));
        }
        Ok(())
    }
}

/// In-memory [`Services`](crate::Services) backend.
#[derive(Debug, Default)]
pub struct MemoryServices {
    state: Mutex<State>,
}

impl MemoryServices {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Seeding ----------------------------------------------------------

    /// Registers an account reachable through `token`.
    pub fn add_account(&self, token: impl Into<String>, account: Account) {
        self.state.lock().accounts.insert(token.into(), account);
    }

    /// Bans every anonymous identity created from `ip`.
    pub fn ban_ip(&self, ip: impl Into<String>) {
        self.state.lock().banned_ips.insert(ip.into());
    }

    pub fn set_medals(&self, uuid: &str, medals: Medals) {
        self.state.lock().medals.insert(uuid.to_string(), medals);
    }

    pub fn set_game_data(&self, uuid: &str, data: GameData) {
        self.state.lock().game_data.insert(uuid.to_string(), data);
    }

    pub fn set_tags(&self, uuid: &str, tags: &[&str]) {
        let tags = tags.iter().map(|t| t.to_string()).collect();
        self.state.lock().tags.insert(uuid.to_string(), tags);
    }

    pub fn set_minigame_score(&self, uuid: &str, minigame_id: &str, score: i32) {
        self.state
            .lock()
            .scores
            .insert((uuid.to_string(), minigame_id.to_string()), score);
    }

    pub fn set_friends(&self, uuid: &str, friends: Vec<Friend>) {
        self.state.lock().friends.insert(uuid.to_string(), friends);
    }

    /// Stores a party. Its members become part of it.
    pub fn set_party(&self, party: Party) {
        self.state.lock().parties.insert(party.id, party);
    }

    pub fn set_event_period(&self, period: EventPeriod) {
        self.state.lock().period = Some(period);
    }

    pub fn add_event_location(&self, location: EventLocation) {
        self.state.lock().event_locations.push(location);
    }

    pub fn set_vending_machine(&self, machine: Option<VendingMachine>) {
        self.state.lock().vending_machine = machine;
    }

    /// Makes the named trait method fail with [`StoreError::Backend`].
    pub fn fail(&self, op: &'static str) {
        self.state.lock().failing.insert(op);
    }

    // -- Inspection -------------------------------------------------------

    pub fn game_data_of(&self, uuid: &str) -> Option<GameData> {
        self.state.lock().game_data.get(uuid).cloned()
    }

    pub fn name_of(&self, uuid: &str) -> Option<String> {
        self.state.lock().names.get(uuid).cloned()
    }

    pub fn private_mode_of(&self, uuid: &str) -> Option<bool> {
        self.state.lock().private_mode.get(uuid).copied()
    }

    pub fn activity_of(&self, uuid: &str) -> u32 {
        self.state.lock().activity.get(uuid).copied().unwrap_or(0)
    }

    pub fn tags_of(&self, uuid: &str) -> Vec<String> {
        self.state.lock().tags.get(uuid).cloned().unwrap_or_default()
    }

    pub fn minigame_score_of(&self, uuid: &str, minigame_id: &str) -> Option<i32> {
        self.state
            .lock()
            .scores
            .get(&(uuid.to_string(), minigame_id.to_string()))
            .copied()
    }

    pub fn location_colors_of(&self, location: &str) -> Option<(String, String)> {
        self.state.lock().location_colors.get(location).cloned()
    }

    pub fn event_actions(&self) -> Vec<(String, i32, bool)> {
        self.state.lock().event_actions.clone()
    }
}

/// Generates a random 32-character hex uuid.
fn generate_uuid() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl PlayerStore for MemoryServices {
    async fn account_by_token(&self, token: &str) -> Result<Option<Account>, StoreError> {
        let state = self.state.lock();
        state.check("account_by_token")?;
        let mut account = state.accounts.get(token).cloned();
        if let Some(account) = account.as_mut() {
            if let Some(name) = state.names.get(&account.uuid) {
                account.name = name.clone();
            }
        }
        Ok(account)
    }

    async fn anonymous_by_ip(&self, ip: &str) -> Result<AnonymousPlayer, StoreError> {
        let mut state = self.state.lock();
        state.check("anonymous_by_ip")?;
        let banned = state.banned_ips.contains(ip);
        let player = state
            .anonymous
            .entry(ip.to_string())
            .or_insert_with(|| AnonymousPlayer {
                uuid: generate_uuid(),
                banned: false,
                muted: false,
            });
        player.banned |= banned;
        Ok(player.clone())
    }

    async fn medals(&self, uuid: &str) -> Result<Medals, StoreError> {
        let state = self.state.lock();
        state.check("medals")?;
        Ok(state.medals.get(uuid).copied().unwrap_or_default())
    }

    async fn game_data(&self, uuid: &str) -> Result<GameData, StoreError> {
        let state = self.state.lock();
        state.check("game_data")?;
        Ok(state.game_data.get(uuid).cloned().unwrap_or_default())
    }

    async fn save_game_data(&self, uuid: &str, data: &GameData) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check("save_game_data")?;
        state.game_data.insert(uuid.to_string(), data.clone());
        Ok(())
    }

    async fn party_id(&self, uuid: &str) -> Result<Option<i32>, StoreError> {
        let state = self.state.lock();
        state.check("party_id")?;
        Ok(state
            .parties
            .values()
            .find(|party| party.members.iter().any(|m| m.uuid == uuid))
            .map(|party| party.id))
    }

    async fn set_name(&self, uuid: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check("set_name")?;
        state.names.insert(uuid.to_string(), name.to_string());
        Ok(())
    }

    async fn set_private_mode(&self, uuid: &str, private: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check("set_private_mode")?;
        state.private_mode.insert(uuid.to_string(), private);
        Ok(())
    }

    async fn mark_game_activity(&self, uuid: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check("mark_game_activity")?;
        *state.activity.entry(uuid.to_string()).or_default() += 1;
        Ok(())
    }

    async fn player_tags(&self, uuid: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock();
        state.check("player_tags")?;
        Ok(state.tags.get(uuid).cloned().unwrap_or_default())
    }

    async fn try_write_tag(&self, uuid: &str, tag: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        state.check("try_write_tag")?;
        let tags = state.tags.entry(uuid.to_string()).or_default();
        if tags.iter().any(|t| t == tag) {
            return Ok(false);
        }
        tags.push(tag.to_string());
        Ok(true)
    }

    async fn minigame_score(&self, uuid: &str, minigame_id: &str) -> Result<i32, StoreError> {
        let state = self.state.lock();
        state.check("minigame_score")?;
        Ok(state
            .scores
            .get(&(uuid.to_string(), minigame_id.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn write_minigame_score(
        &self,
        uuid: &str,
        minigame_id: &str,
        score: i32,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check("write_minigame_score")?;
        state
            .scores
            .insert((uuid.to_string(), minigame_id.to_string()), score);
        Ok(())
    }

    async fn save_location_colors(
        &self,
        location: &str,
        fg_color: &str,
        bg_color: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check("save_location_colors")?;
        state.location_colors.insert(
            location.to_string(),
            (fg_color.to_string(), bg_color.to_string()),
        );
        Ok(())
    }
}

impl SocialGraph for MemoryServices {
    async fn friends(&self, uuid: &str) -> Result<Vec<Friend>, StoreError> {
        let state = self.state.lock();
        state.check("friends")?;
        Ok(state.friends.get(uuid).cloned().unwrap_or_default())
    }

    async fn party(&self, party_id: i32) -> Result<Party, StoreError> {
        let state = self.state.lock();
        state.check("party")?;
        state
            .parties
            .get(&party_id)
            .cloned()
            .ok_or(StoreError::NotFound("party"))
    }
}

impl EventBoard for MemoryServices {
    async fn current_period(&self) -> Result<EventPeriod, StoreError> {
        let state = self.state.lock();
        state.check("current_period")?;
        state.period.clone().ok_or(StoreError::NotFound("event period"))
    }

    async fn event_locations(&self, uuid: &str) -> Result<Vec<EventLocation>, StoreError> {
        let state = self.state.lock();
        state.check("event_locations")?;
        let done = state.completed.get(uuid);
        Ok(state
            .event_locations
            .iter()
            .map(|loc| EventLocation {
                complete: done.is_some_and(|d| d.contains(&loc.id)),
                ..loc.clone()
            })
            .collect())
    }

    async fn exp(&self, uuid: &str) -> Result<i32, StoreError> {
        let state = self.state.lock();
        state.check("exp")?;
        Ok(state.exp.get(uuid).copied().unwrap_or(0))
    }

    async fn claim(&self, uuid: &str, event_id: &str) -> Result<i32, StoreError> {
        let mut state = self.state.lock();
        state.check("claim")?;
        let completed = state
            .completed
            .get(uuid)
            .is_some_and(|d| d.contains(event_id));
        if !completed {
            return Ok(0);
        }
        Ok(i32::from(
            state.claimed.insert((uuid.to_string(), event_id.to_string())),
        ))
    }

    async fn complete_locations(&self, uuid: &str, locations: &[String]) -> Result<i32, StoreError> {
        let mut state = self.state.lock();
        state.check("complete_locations")?;
        let matching: Vec<(String, i32)> = state
            .event_locations
            .iter()
            .filter(|loc| locations.contains(&loc.title))
            .map(|loc| (loc.id.clone(), loc.exp))
            .collect();

        let mut gained = 0;
        for (id, exp) in matching {
            if state.completed.entry(uuid.to_string()).or_default().insert(id) {
                gained += exp;
            }
        }
        *state.exp.entry(uuid.to_string()).or_default() += gained;
        Ok(gained)
    }

    async fn complete_event_action(
        &self,
        uuid: &str,
        event_id: i32,
        action: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check("complete_event_action")?;
        state
            .event_actions
            .push((uuid.to_string(), event_id, action));
        Ok(())
    }

    async fn vending_machine(&self) -> Result<Option<VendingMachine>, StoreError> {
        let state = self.state.lock();
        state.check("vending_machine")?;
        Ok(state.vending_machine)
    }
}
