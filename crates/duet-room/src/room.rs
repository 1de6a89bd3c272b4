//! A room: one game map and the clients standing in it.
//!
//! Rooms are created once at startup and never destroyed. Clients come and
//! go through [`Rooms`](crate::Rooms); a room only stores them and fans
//! messages out.

use std::sync::Arc;

use dashmap::DashMap;
use duet_protocol::{message, RoomId, FIELD_DELIM};
use duet_session::logging::error_log;
use duet_session::Services;
use duet_transport::ConnectionId;

use crate::client::RoomClient;
use crate::config::MinigameConfig;
use crate::trigger::Condition;

/// Tag whose broadcast is echoed back to the sender.
const ECHO_TAG: &str = "say";

/// Shards per room client map. Most rooms stay empty.
const CLIENT_SHARDS: usize = 4;

/// One map and its connected clients.
pub struct Room<S> {
    id: RoomId,
    singleplayer: bool,
    conditions: Vec<Condition>,
    minigames: Vec<MinigameConfig>,
    vending_event_ids: Vec<i32>,
    clients: DashMap<ConnectionId, Arc<RoomClient<S>>>,
}

impl<S: Services> Room<S> {
    pub(crate) fn new(
        id: RoomId,
        singleplayer: bool,
        conditions: Vec<Condition>,
        minigames: Vec<MinigameConfig>,
        vending_event_ids: Vec<i32>,
    ) -> Self {
        Self {
            id,
            singleplayer,
            conditions,
            minigames,
            vending_event_ids,
            clients: DashMap::with_shard_amount(CLIENT_SHARDS),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn is_singleplayer(&self) -> bool {
        self.singleplayer
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn minigames(&self) -> &[MinigameConfig] {
        &self.minigames
    }

    /// Number of registered clients, valid or not.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub(crate) fn add(&self, client: Arc<RoomClient<S>>) {
        self.clients.insert(client.connection_id(), client);
    }

    pub(crate) fn remove(&self, conn: ConnectionId) -> bool {
        self.clients.remove(&conn).is_some()
    }

    pub(crate) fn cancel_all(&self) {
        for entry in self.clients.iter() {
            entry.value().cancel();
        }
    }

    /// Sends `msg` to every valid client except the sender. `say` reaches
    /// the sender too. Singleplayer rooms send nothing.
    pub fn broadcast(&self, sender: ConnectionId, msg: &str) {
        if self.singleplayer {
            return;
        }
        let echo = msg.split(FIELD_DELIM).next() == Some(ECHO_TAG);

        for entry in self.clients.iter() {
            let client = entry.value();
            if !client.is_valid() || (*entry.key() == sender && !echo) {
                continue;
            }
            client.send(msg);
        }
    }

    /// Other valid clients, for resync.
    fn others(&self, conn: ConnectionId) -> Vec<Arc<RoomClient<S>>> {
        self.clients
            .iter()
            .filter(|e| *e.key() != conn && e.value().is_valid())
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Brings a client that just became valid up to date.
    pub(crate) async fn resync(&self, client: &RoomClient<S>) {
        let session = client.session();

        if !self.singleplayer {
            self.broadcast(
                client.connection_id(),
                &message!(
                    "c",
                    session.id(),
                    session.uuid(),
                    session.rank(),
                    session.is_account(),
                    session.badge(),
                ),
            );
            let name = session.name();
            if !name.is_empty() {
                self.broadcast(client.connection_id(), &message!("name", session.id(), name));
            }

            for other in self.others(client.connection_id()) {
                for msg in snapshot(&other) {
                    client.send(msg);
                }
            }
        }

        client.run_trigger("", "").await;

        let services = client.services();
        let mut scores = Vec::with_capacity(self.minigames.len());
        for minigame in &self.minigames {
            let score = match services.minigame_score(session.uuid(), &minigame.minigame_id).await {
                Ok(score) => score,
                Err(e) => {
                    error_log(session.uuid(), self.id, &e);
                    0
                }
            };
            scores.push(score);
            let mode = if minigame.initial_var_sync { 2 } else { 1 };
            client.send(message!("sv", minigame.var_id, mode));
        }
        client.with_state(|s| s.minigame_scores.extend(scores));

        match services.vending_machine().await {
            Ok(Some(vm)) if vm.map_id == self.id.0 && self.vending_event_ids.contains(&vm.event_id) => {
                client.send(message!("sev", vm.event_id, 1));
            }
            Ok(_) => {}
            Err(e) => error_log(session.uuid(), self.id, &e),
        }
    }
}

/// The messages that recreate `other` on a joining client, in order.
fn snapshot<S: Services>(other: &RoomClient<S>) -> Vec<String> {
    let session = other.session();
    let id = session.id();
    let profile = session.profile();
    let state = other.state();

    let mut msgs = vec![
        message!(
            "c",
            id,
            session.uuid(),
            session.rank(),
            session.is_account(),
            session.badge(),
        ),
        message!("m", id, state.x, state.y),
    ];
    if state.facing != 0 {
        msgs.push(message!("f", id, state.facing));
    }
    msgs.push(message!("spd", id, state.speed));
    if !profile.name.is_empty() {
        msgs.push(message!("name", id, profile.name));
    }
    if profile.sprite_index >= 0 {
        msgs.push(message!("spr", id, profile.sprite, profile.sprite_index));
    }
    if state.repeating_flash {
        msgs.push(message!("rfl", id, state.flash));
    }
    if state.hidden {
        msgs.push(message!("h", id, true));
    }
    if !profile.system.is_empty() {
        msgs.push(message!("sys", id, profile.system));
    }
    for (pic_id, pic) in &state.pictures {
        msgs.push(message!(
            "ap",
            id,
            *pic_id,
            pic.params,
            pic.name.as_str(),
            pic.use_transparent_color,
            pic.fixed_to_map,
        ));
    }
    msgs
}
