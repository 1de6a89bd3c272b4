//! The room registry: admits room sockets and routes their messages.
//!
//! # Join flow
//!
//! ```text
//! room exists? ──→ identify ──→ live session? ──→ bind presence (CAS)
//!                                                    │
//!        spawn link ←── s handshake ←── register ←───┘
//! ```
//!
//! A joined client stays invisible until it sends `ident`; then it is
//! resynced with everyone already in the room.

use std::collections::HashMap;
use std::sync::Arc;

use duet_protocol::{message, split_messages, FrameVerifier, RoomId, MESSAGE_DELIM_STR};
use duet_session::logging::{access_log, error_log};
use duet_session::{RoomPresence, SessionError, Services, Sessions};
use duet_transport::{spawn_link, Cancel, Connection, Outbox, WriteMode};

use crate::client::RoomClient;
use crate::room::Room;
use crate::trigger::{Condition, TriggerEvaluator};
use crate::{RoomError, RoomsConfig};

/// Registry of every room.
pub struct Rooms<S> {
    rooms: HashMap<u32, Arc<Room<S>>>,
    sessions: Arc<Sessions<S>>,
    evaluator: Arc<dyn TriggerEvaluator>,
    config: RoomsConfig,
}

impl<S: Services> Rooms<S> {
    /// Creates rooms `0..=config.max_room_id`, handing each the conditions
    /// and minigames that belong to its map.
    pub fn new(
        sessions: Arc<Sessions<S>>,
        config: RoomsConfig,
        conditions: Vec<Condition>,
        evaluator: Arc<dyn TriggerEvaluator>,
    ) -> Self {
        let rooms = (0..=config.max_room_id)
            .map(|id| {
                let room = Room::new(
                    RoomId(id),
                    config.singleplayer_rooms.contains(&id),
                    conditions.iter().filter(|c| c.map == id).cloned().collect(),
                    config.minigames.iter().filter(|m| m.room == id).cloned().collect(),
                    config.vending_machines.get(&id).cloned().unwrap_or_default(),
                );
                (id, Arc::new(room))
            })
            .collect();

        tracing::info!(rooms = config.max_room_id + 1, "rooms created");
        Self {
            rooms,
            sessions,
            evaluator,
            config,
        }
    }

    pub fn get(&self, room_id: u32) -> Option<Arc<Room<S>>> {
        self.rooms.get(&room_id).cloned()
    }

    pub fn sessions(&self) -> &Arc<Sessions<S>> {
        &self.sessions
    }

    /// Clients across all rooms.
    pub fn client_count(&self) -> usize {
        self.rooms.values().map(|r| r.client_count()).sum()
    }

    /// Admits a room socket for the player's live session.
    ///
    /// # Errors
    /// - [`RoomError::NotFound`]: no such room
    /// - [`SessionError::NoSession`]: the player has no session socket
    /// - [`SessionError::SessionBusy`]: the session is bound to another room
    ///   socket
    pub async fn join<C: Connection>(
        self: &Arc<Self>,
        room_id: u32,
        conn: C,
        ip: &str,
        token: Option<&str>,
    ) -> Result<Arc<RoomClient<S>>, RoomError> {
        self.try_join(room_id, conn, ip, token)
            .await
            .inspect_err(|e| error_log(ip, room_id, e))
    }

    async fn try_join<C: Connection>(
        self: &Arc<Self>,
        room_id: u32,
        conn: C,
        ip: &str,
        token: Option<&str>,
    ) -> Result<Arc<RoomClient<S>>, RoomError> {
        let room = self.get(room_id).ok_or(RoomError::NotFound(RoomId(room_id)))?;
        let identity = self.sessions.identify(ip, token).await?;
        let session = self
            .sessions
            .get(&identity.uuid)
            .ok_or(SessionError::NoSession)?;

        let services = self.sessions.services();
        let tags = match services.player_tags(session.uuid()).await {
            Ok(tags) => tags,
            Err(e) => {
                error_log(session.uuid(), room.id(), &e);
                Vec::new()
            }
        };

        let verifier = FrameVerifier::new(rand::random(), Arc::clone(&self.config.secret));
        let (outbox, rx) = Outbox::channel(
            self.config.outbox_capacity,
            format!("room:{}:{}", room.id(), session.uuid()),
        );
        let cancel = Cancel::new();
        let client = Arc::new(RoomClient::new(
            conn.id(),
            verifier,
            Arc::clone(&session),
            Arc::clone(services),
            Arc::clone(&self.evaluator),
            Arc::clone(&room),
            tags,
            outbox,
            cancel.clone(),
        ));

        let presence: Arc<dyn RoomPresence> = client.clone();
        if !session.try_bind(presence) {
            return Err(SessionError::SessionBusy.into());
        }
        // The session may have ended before the presence was bound.
        if session.is_cancelled() {
            session.unbind(client.connection_id());
            return Err(SessionError::NoSession.into());
        }

        room.add(Arc::clone(&client));
        client.send(handshake(&client));

        let processor = {
            let rooms = Arc::clone(self);
            let client = Arc::clone(&client);
            move |data: Vec<u8>| {
                let rooms = Arc::clone(&rooms);
                let client = Arc::clone(&client);
                async move { rooms.process(&client, &data).await }
            }
        };
        let on_disconnect = {
            let rooms = Arc::clone(self);
            let client = Arc::clone(&client);
            move || async move { rooms.disconnect(&client) }
        };
        spawn_link(
            conn,
            rx,
            cancel,
            WriteMode::Coalesced {
                delimiter: MESSAGE_DELIM_STR,
            },
            self.config.link.clone(),
            processor,
            on_disconnect,
        );

        access_log(session.uuid(), room.id(), "connect");
        Ok(client)
    }

    /// Verifies one frame and dispatches each message in it.
    async fn process(&self, client: &Arc<RoomClient<S>>, data: &[u8]) {
        let uuid = client.session().uuid();
        let payload = match client.verify(data) {
            Ok(payload) => payload,
            Err(e) => {
                error_log(uuid, client.room().id(), &e);
                return;
            }
        };

        for fields in split_messages(payload) {
            let raw = fields.raw();
            match self.dispatch(client, fields).await {
                Ok(()) => access_log(uuid, client.room().id(), raw),
                Err(e) => error_log(uuid, client.room().id(), &e),
            }
        }
    }

    /// Removes the client from its room and tells the others.
    pub(crate) fn leave(&self, client: &RoomClient<S>, room: &Room<S>) {
        room.remove(client.connection_id());
        if client.is_valid() {
            room.broadcast(
                client.connection_id(),
                &message!("d", client.session().id()),
            );
        }
    }

    /// Moves a valid client to another room over the same socket.
    pub(crate) async fn switch_room(
        &self,
        client: &Arc<RoomClient<S>>,
        room_id: u32,
    ) -> Result<(), RoomError> {
        let next = self.get(room_id).ok_or(RoomError::NotFound(RoomId(room_id)))?;
        let current = client.room();

        self.leave(client, &current);
        client.reset(next.id());
        client.set_room(Arc::clone(&next));
        next.add(Arc::clone(client));

        client.send(handshake(client));
        next.resync(client).await;
        Ok(())
    }

    /// Cleanup after the room link ended.
    fn disconnect(&self, client: &Arc<RoomClient<S>>) {
        client.session().unbind(client.connection_id());
        let room = client.room();
        self.leave(client, &room);
        access_log(client.session().uuid(), room.id(), "disconnect");
    }

    /// Cancels every room connection.
    pub fn shutdown(&self) {
        for room in self.rooms.values() {
            room.cancel_all();
        }
    }
}

/// The private `s` handshake: id, signing key and identity.
fn handshake<S: Services>(client: &RoomClient<S>) -> String {
    let session = client.session();
    message!(
        "s",
        session.id(),
        client.key(),
        session.uuid(),
        session.rank(),
        session.is_account(),
        session.badge(),
    )
}
