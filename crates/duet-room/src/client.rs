//! Room clients: one player's presence on one room socket.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use duet_protocol::{message, FrameVerifier, PictureParams, ProtocolError, RoomId};
use duet_session::logging::error_log;
use duet_session::{BoxFuture, PresenceLocation, RoomPresence, Services, SessionClient};
use duet_transport::{Cancel, ConnectionId, Outbox};
use parking_lot::Mutex;

use crate::room::Room;
use crate::trigger::{PlayerContext, SyncCommand, TriggerEvaluator};

/// Highest picture slot.
pub const MAX_PICTURES: i32 = 50;

/// A picture shown by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub name: String,
    pub params: PictureParams,
    pub use_transparent_color: bool,
    pub fixed_to_map: bool,
}

/// Replicated state of a room client. Reset when switching rooms.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub x: i32,
    pub y: i32,
    pub facing: i32,
    pub speed: i32,
    /// `[r, g, b, power, frames]`.
    pub flash: [i32; 5],
    pub repeating_flash: bool,
    pub hidden: bool,
    /// Occupied picture slots, by id.
    pub pictures: BTreeMap<i32, Picture>,
    pub map_id: String,
    pub prev_map_id: String,
    pub prev_locations: String,
    pub locations: Vec<String>,
    pub tags: Vec<String>,
    pub switch_cache: HashMap<i32, bool>,
    pub var_cache: HashMap<i32, i32>,
    /// Stored scores, parallel to the room's minigame configs.
    pub minigame_scores: Vec<i32>,
}

impl ClientState {
    fn new(room: RoomId, tags: Vec<String>) -> Self {
        Self {
            map_id: room.map_id(),
            tags,
            ..Self::default()
        }
    }
}

/// One player's connection to a room.
pub struct RoomClient<S> {
    conn_id: ConnectionId,
    key: u32,
    session: Arc<SessionClient>,
    services: Arc<S>,
    evaluator: Arc<dyn TriggerEvaluator>,
    verifier: Mutex<FrameVerifier>,
    outbox: Outbox,
    cancel: Cancel,
    valid: AtomicBool,
    room: Mutex<Arc<Room<S>>>,
    state: Mutex<ClientState>,
}

impl<S: Services> RoomClient<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        conn_id: ConnectionId,
        verifier: FrameVerifier,
        session: Arc<SessionClient>,
        services: Arc<S>,
        evaluator: Arc<dyn TriggerEvaluator>,
        room: Arc<Room<S>>,
        tags: Vec<String>,
        outbox: Outbox,
        cancel: Cancel,
    ) -> Self {
        let state = ClientState::new(room.id(), tags);
        Self {
            conn_id,
            key: verifier.key(),
            session,
            services,
            evaluator,
            verifier: Mutex::new(verifier),
            outbox,
            cancel,
            valid: AtomicBool::new(false),
            room: Mutex::new(room),
            state: Mutex::new(state),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// The signing key handed out in the `s` handshake.
    pub fn key(&self) -> u32 {
        self.key
    }

    pub fn session(&self) -> &Arc<SessionClient> {
        &self.session
    }

    pub(crate) fn services(&self) -> &Arc<S> {
        &self.services
    }

    pub fn room(&self) -> Arc<Room<S>> {
        Arc::clone(&self.room.lock())
    }

    pub(crate) fn set_room(&self, room: Arc<Room<S>>) {
        *self.room.lock() = room;
    }

    /// Whether the client sent `ident`. Invalid clients are invisible.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub(crate) fn set_valid(&self) {
        self.valid.store(true, Ordering::Release);
    }

    /// A snapshot of the replicated state.
    pub fn state(&self) -> ClientState {
        self.state.lock().clone()
    }

    /// Runs `f` with the state locked. `f` must not touch other clients.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut ClientState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Resets the state for a new room, keeping tags.
    pub(crate) fn reset(&self, room: RoomId) {
        let mut state = self.state.lock();
        let tags = std::mem::take(&mut state.tags);
        *state = ClientState::new(room, tags);
    }

    /// Checks a raw frame and returns its payload.
    pub(crate) fn verify<'a>(&self, frame: &'a [u8]) -> Result<&'a str, ProtocolError> {
        self.verifier.lock().verify(frame)
    }

    /// Queues a message on the room socket. Never blocks.
    pub fn send(&self, msg: impl Into<String>) -> bool {
        self.outbox.push(msg)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn player_context(&self) -> PlayerContext {
        let state = self.state.lock();
        PlayerContext {
            account: self.session.is_account(),
            rank: self.session.rank(),
            x: state.x,
            y: state.y,
        }
    }

    // -- Triggers ---------------------------------------------------------

    /// Evaluates `trigger` against the room's conditions.
    pub(crate) async fn run_trigger(&self, trigger: &str, value: &str) {
        let room = self.room();
        let commands = self
            .evaluator
            .on_trigger(room.conditions(), &self.player_context(), trigger, value);
        self.apply(commands).await;
    }

    pub(crate) async fn run_switch(&self, id: i32, value: bool) {
        let room = self.room();
        let commands = self
            .evaluator
            .on_switch(room.conditions(), &self.player_context(), id, value);
        self.apply(commands).await;
    }

    pub(crate) async fn run_variable(&self, id: i32, value: i32) {
        let room = self.room();
        let commands = self
            .evaluator
            .on_variable(room.conditions(), &self.player_context(), id, value);
        self.apply(commands).await;
    }

    /// Carries out evaluator results for this client.
    async fn apply(&self, commands: Vec<SyncCommand>) {
        for command in commands {
            match command {
                SyncCommand::SwitchSync { id, mode } => {
                    self.send(message!("ss", id, mode));
                }
                SyncCommand::VarSync { id, mode } => {
                    self.send(message!("sv", id, mode));
                }
                SyncCommand::EventSync { event_id, kind } => {
                    self.send(message!("sev", event_id, kind));
                }
                SyncCommand::TagUnlock { condition_id } => {
                    match self
                        .services
                        .try_write_tag(self.session.uuid(), &condition_id)
                        .await
                    {
                        Ok(true) => {
                            self.with_state(|s| s.tags.push(condition_id));
                            self.send(message!("b"));
                        }
                        Ok(false) => {}
                        Err(e) => error_log(self.session.uuid(), self.room().id(), &e),
                    }
                }
            }
        }
    }
}

impl<S: Services> RoomPresence for RoomClient<S> {
    fn room_id(&self) -> RoomId {
        self.room.lock().id()
    }

    fn connection_id(&self) -> ConnectionId {
        self.conn_id
    }

    fn location(&self) -> PresenceLocation {
        let state = self.state.lock();
        PresenceLocation {
            map_id: state.map_id.clone(),
            prev_map_id: state.prev_map_id.clone(),
            prev_locations: state.prev_locations.clone(),
            x: state.x,
            y: state.y,
        }
    }

    fn announce_name(&self, name: &str) {
        self.room()
            .broadcast(self.conn_id, &message!("name", self.session.id(), name));
    }

    fn report_previous_location(
        &self,
        prev_map_id: String,
        prev_locations: String,
    ) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.with_state(|s| {
                s.prev_map_id = prev_map_id.clone();
                s.prev_locations = prev_locations;
            });
            self.run_trigger("prevMap", &prev_map_id).await;
        })
    }

    fn enter_locations(&self, locations: Vec<String>) {
        self.with_state(|s| s.locations = locations);
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}
