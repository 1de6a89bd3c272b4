//! Integration tests for the room layer.
//!
//! Every player opens a session socket and a room socket over in-memory
//! pairs and signs room frames the way a game client does.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use duet_protocol::{
    join_fields, sign_frame, Rank, RoomId, FIELD_DELIM, MESSAGE_DELIM, MESSAGE_DELIM_STR,
};
use duet_room::{
    Condition, ConditionEvaluator, MinigameConfig, RoomClient, RoomError, Rooms, RoomsConfig,
};
use duet_session::{
    Account, MemoryServices, SessionClient, SessionConfig, SessionError, Sessions,
    VendingMachine,
};
use duet_transport::memory::{pair, MemoryPeer};
use duet_transport::{Frame, CLOSE_CODE};

const SECRET: &[u8] = b"test-secret";
const SINGLEPLAYER: u32 = 5;

// -- Helpers --------------------------------------------------------------

type TestRooms = Arc<Rooms<MemoryServices>>;

fn config() -> RoomsConfig {
    RoomsConfig {
        game_name: "2kki".to_string(),
        max_room_id: 10,
        singleplayer_rooms: vec![SINGLEPLAYER],
        secret: Arc::from(SECRET),
        ..RoomsConfig::default()
    }
}

fn setup_with(config: RoomsConfig, conditions: Vec<Condition>) -> (TestRooms, Arc<MemoryServices>) {
    let services = Arc::new(MemoryServices::new());
    let sessions = Arc::new(Sessions::new(Arc::clone(&services), SessionConfig::default()));
    let evaluator = Arc::new(ConditionEvaluator::new(config.game_name.clone()));
    let rooms = Arc::new(Rooms::new(sessions, config, conditions, evaluator));
    (rooms, services)
}

fn setup() -> (TestRooms, Arc<MemoryServices>) {
    setup_with(config(), Vec::new())
}

fn token(n: u32) -> String {
    format!("{n:0>32}")
}

fn uuid(n: u32) -> String {
    format!("player-{n}")
}

fn ip(n: u32) -> String {
    format!("10.0.0.{n}")
}

/// One game client with both sockets open.
struct Player {
    id: String,
    key: u32,
    counter: u32,
    client: Arc<RoomClient<MemoryServices>>,
    session: Arc<SessionClient>,
    session_peer: MemoryPeer,
    room_peer: MemoryPeer,
    inbox: VecDeque<String>,
}

impl Player {
    /// Registers account `n`, opens its session and joins `room`.
    async fn join(rooms: &TestRooms, services: &MemoryServices, n: u32, room: u32) -> Player {
        services.add_account(
            token(n),
            Account {
                uuid: uuid(n),
                name: String::new(),
                rank: Rank::PLAYER,
                badge: String::new(),
                banned: false,
                muted: false,
            },
        );
        let (conn, session_peer) = pair();
        let session = rooms
            .sessions()
            .connect(conn, &ip(n), Some(&token(n)))
            .await
            .expect("session should connect");

        let (conn, room_peer) = pair();
        let client = rooms
            .join(room, conn, &ip(n), Some(&token(n)))
            .await
            .expect("room should accept");

        let mut player = Player {
            id: session.id().to_string(),
            key: 0,
            counter: 0,
            client,
            session,
            session_peer,
            room_peer,
            inbox: VecDeque::new(),
        };
        player.key = player.expect_handshake().await;
        player
    }

    /// Joins and sends `ident`.
    async fn enter(rooms: &TestRooms, services: &MemoryServices, n: u32, room: u32) -> Player {
        let mut player = Self::join(rooms, services, n, room).await;
        player.send(&[&["ident"]]);
        wait_until(|| player.client.is_valid()).await;
        player
    }

    /// Reads an `s` handshake and returns the key.
    async fn expect_handshake(&mut self) -> u32 {
        let msg = self.next().await;
        let fields: Vec<_> = msg.split(FIELD_DELIM).collect();
        assert_eq!(fields[0], "s", "expected handshake, got {msg:?}");
        assert_eq!(fields[1], self.id);
        assert_eq!(fields[3], self.session.uuid());
        fields[2].parse().expect("key should be numeric")
    }

    fn frame(&mut self, messages: &[&[&str]]) -> Vec<u8> {
        let payload = messages
            .iter()
            .map(|fields| join_fields(fields))
            .collect::<Vec<_>>()
            .join(MESSAGE_DELIM_STR);
        self.counter += 1;
        sign_frame(self.key, SECRET, self.counter, payload.as_bytes())
    }

    /// Signs and sends one frame holding `messages`.
    fn send(&mut self, messages: &[&[&str]]) {
        let frame = self.frame(messages);
        assert!(self.room_peer.send(frame));
    }

    /// Next message on the room socket, unpacking coalesced frames.
    async fn next(&mut self) -> String {
        loop {
            if let Some(msg) = self.inbox.pop_front() {
                return msg;
            }
            let frame = tokio::time::timeout(Duration::from_secs(1), self.room_peer.recv())
                .await
                .expect("frame should arrive")
                .expect("connection should be open");
            match frame {
                Frame::Binary(data) => {
                    let text = String::from_utf8(data).expect("frames are UTF-8");
                    self.inbox
                        .extend(text.split(MESSAGE_DELIM).map(str::to_string));
                }
                Frame::Ping => continue,
                other => panic!("expected binary frame, got {other:?}"),
            }
        }
    }

    async fn expect(&mut self, fields: &[&str]) {
        assert_eq!(self.next().await, join_fields(fields));
    }

    async fn assert_silent(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(self.inbox.pop_front(), None);
        assert_eq!(self.room_peer.try_recv(), None);
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn zeros(n: usize) -> Vec<&'static str> {
    vec!["0"; n]
}

/// An `ap` request for `pic_id` with zeroed parameters.
fn show_picture(pic_id: &'static str, name: &'static str) -> Vec<&'static str> {
    let mut fields = vec!["ap", pic_id];
    fields.extend(zeros(15));
    fields.extend([name, "1", "0"]);
    fields
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_join_sends_private_handshake() {
    let (rooms, services) = setup();
    let mut player = Player::join(&rooms, &services, 1, 1).await;

    assert_eq!(rooms.client_count(), 1);
    assert!(!player.client.is_valid());
    assert_eq!(player.client.key(), player.key);
    player.assert_silent().await;
}

#[tokio::test]
async fn test_join_unknown_room_not_found() {
    let (rooms, _) = setup();
    let (conn, _peer) = pair();
    let Err(err) = rooms.join(99, conn, "10.0.0.1", None).await else {
        panic!("join should fail");
    };
    assert!(matches!(err, RoomError::NotFound(RoomId(99))));
}

#[tokio::test]
async fn test_join_without_session_no_session() {
    let (rooms, _) = setup();
    let (conn, _peer) = pair();
    let Err(err) = rooms.join(1, conn, "10.0.0.1", None).await else {
        panic!("join should fail");
    };
    assert!(matches!(err, RoomError::Session(SessionError::NoSession)));
}

#[tokio::test]
async fn test_join_second_room_socket_session_busy() {
    let (rooms, services) = setup();
    let _player = Player::join(&rooms, &services, 1, 1).await;

    let (conn, _peer) = pair();
    let Err(err) = rooms.join(2, conn, &ip(1), Some(&token(1))).await else {
        panic!("join should fail");
    };
    assert!(matches!(err, RoomError::Session(SessionError::SessionBusy)));
    assert_eq!(rooms.client_count(), 1);
}

#[tokio::test]
async fn test_ident_announces_to_room() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let b = Player::enter(&rooms, &services, 2, 1).await;

    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;
}

#[tokio::test]
async fn test_repeated_ident_is_noop() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;
    b.expect(&["c", &a.id, &uuid(1), "0", "1", "null"]).await;
    b.expect(&["m", &a.id, "0", "0"]).await;
    b.expect(&["spd", &a.id, "0"]).await;

    b.send(&[&["ident"]]);
    a.assert_silent().await;
    b.assert_silent().await;
}

// =========================================================================
// Frame verification
// =========================================================================

#[tokio::test]
async fn test_messages_before_ident_rejected() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::join(&rooms, &services, 2, 1).await;

    b.send(&[&["m", "3", "3"]]);
    a.assert_silent().await;

    b.send(&[&["ident"]]);
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;
}

#[tokio::test]
async fn test_replayed_frame_ignored() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;

    let frame = b.frame(&[&["m", "1", "1"]]);
    b.room_peer.send(frame.clone());
    b.room_peer.send(frame);
    b.send(&[&["m", "2", "2"]]);

    a.expect(&["m", &b.id, "1", "1"]).await;
    a.expect(&["m", &b.id, "2", "2"]).await;
    a.assert_silent().await;
}

#[tokio::test]
async fn test_bad_signature_and_control_bytes_ignored() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;

    // Wrong key.
    let forged = sign_frame(
        b.key.wrapping_add(1),
        SECRET,
        b.counter + 1,
        b"m\xEF\xBF\xBF5\xEF\xBF\xBF5",
    );
    b.room_peer.send(forged);
    // Newline in the payload.
    b.counter += 1;
    let bad = sign_frame(b.key, SECRET, b.counter, b"say\xEF\xBF\xBFhi\n");
    b.room_peer.send(bad);
    // The counter did not advance on the rejected frame.
    b.counter -= 1;
    b.send(&[&["m", "6", "6"]]);

    a.expect(&["m", &b.id, "6", "6"]).await;
    a.assert_silent().await;
    assert!(!b.client.session().is_cancelled());
}

#[tokio::test]
async fn test_frame_with_several_messages_dispatches_each() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;

    b.send(&[&["m", "1", "2"], &["f", "3"], &["spd", "4"]]);
    a.expect(&["m", &b.id, "1", "2"]).await;
    a.expect(&["f", &b.id, "3"]).await;
    a.expect(&["spd", &b.id, "4"]).await;
}

// =========================================================================
// Room messages
// =========================================================================

#[tokio::test]
async fn test_move_reaches_others_not_sender() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;
    b.expect(&["c", &a.id, &uuid(1), "0", "1", "null"]).await;
    b.expect(&["m", &a.id, "0", "0"]).await;
    b.expect(&["spd", &a.id, "0"]).await;

    a.send(&[&["tp", "7", "8"]]);
    b.expect(&["tp", &a.id, "7", "8"]).await;
    a.assert_silent().await;

    let state = a.client.state();
    assert_eq!((state.x, state.y), (7, 8));
}

#[tokio::test]
async fn test_out_of_range_values_rejected() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;

    b.send(&[
        &["m", "-1", "0"],
        &["f", "4"],
        &["spd", "11"],
        &["spr", "sheet", "8"],
        &["fl", "256", "0", "0", "0", "0"],
        &["se", "bell", "100", "401", "50"],
        &["rp", "51"],
    ]);
    b.send(&[&["f", "2"]]);

    a.expect(&["f", &b.id, "2"]).await;
    a.assert_silent().await;
}

#[tokio::test]
async fn test_say_echoes_to_sender() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;
    b.expect(&["c", &a.id, &uuid(1), "0", "1", "null"]).await;
    b.expect(&["m", &a.id, "0", "0"]).await;
    b.expect(&["spd", &a.id, "0"]).await;

    a.send(&[&["say", "  hello  "]]);
    let a_id = a.id.clone();
    a.expect(&["say", &a_id, "hello"]).await;
    b.expect(&["say", &a.id, "hello"]).await;
}

#[tokio::test]
async fn test_say_blank_rejected() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;

    a.send(&[&["say", "   "]]);
    a.assert_silent().await;
}

#[tokio::test]
async fn test_move_picture_requires_shown_picture() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;

    let mut move_picture = vec!["mp", "3"];
    move_picture.extend(zeros(15));
    move_picture.push("60");

    b.send(&[&move_picture]);
    a.assert_silent().await;

    b.send(&[&show_picture("3", "sun"), &move_picture]);
    let mut shown = vec!["ap", b.id.as_str(), "3"];
    shown.extend(zeros(15));
    shown.extend(["sun", "1", "0"]);
    a.expect(&shown).await;

    let mut moved = vec!["mp", b.id.as_str(), "3"];
    moved.extend(zeros(15));
    moved.push("60");
    a.expect(&moved).await;

    b.send(&[&["rp", "3"]]);
    a.expect(&["rp", &b.id, "3"]).await;
    wait_until(|| b.client.state().pictures.is_empty()).await;
}

#[tokio::test]
async fn test_event_action_reported_to_board() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;

    a.send(&[&["sev", "4", "1"]]);
    wait_until(|| !services.event_actions().is_empty()).await;
    assert_eq!(services.event_actions(), vec![(uuid(1), 4, true)]);
}

// =========================================================================
// Resync
// =========================================================================

#[tokio::test]
async fn test_resync_replays_state_in_order() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;

    a.session_peer.send("name\u{FFFF}Madotsuki");
    a.send(&[
        &["m", "3", "4"],
        &["f", "2"],
        &["spd", "5"],
        &["spr", "sheet", "1"],
        &["rfl", "10", "20", "30", "40", "50"],
        &["h", "1"],
        &["sys", "blue"],
        &show_picture("9", "moon"),
        &show_picture("2", "star"),
    ]);
    wait_until(|| a.client.state().pictures.len() == 2 && !a.session.name().is_empty()).await;

    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    let id = a.id.clone();
    b.expect(&["c", &id, &uuid(1), "0", "1", "null"]).await;
    b.expect(&["m", &id, "3", "4"]).await;
    b.expect(&["f", &id, "2"]).await;
    b.expect(&["spd", &id, "5"]).await;
    b.expect(&["name", &id, "Madotsuki"]).await;
    b.expect(&["spr", &id, "sheet", "1"]).await;
    b.expect(&["rfl", &id, "10", "20", "30", "40", "50"]).await;
    b.expect(&["h", &id, "1"]).await;
    b.expect(&["sys", &id, "blue"]).await;
    for (pic_id, name) in [("2", "star"), ("9", "moon")] {
        let mut fields = vec!["ap", id.as_str(), pic_id];
        fields.extend(zeros(15));
        fields.extend([name, "1", "0"]);
        b.expect(&fields).await;
    }
    b.assert_silent().await;

    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;
}

#[tokio::test]
async fn test_name_announced_to_room() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;

    b.session_peer.send("name\u{FFFF}Poniko");
    a.expect(&["name", &b.id, "Poniko"]).await;
}

#[tokio::test]
async fn test_singleplayer_room_stays_silent() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, SINGLEPLAYER).await;
    let mut b = Player::enter(&rooms, &services, 2, SINGLEPLAYER).await;

    b.send(&[&["m", "1", "1"], &["say", "anyone?"]]);
    a.assert_silent().await;
    b.assert_silent().await;
}

// =========================================================================
// Leaving
// =========================================================================

#[tokio::test]
async fn test_room_disconnect_broadcasts_leave() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;

    b.room_peer.hang_up();
    a.expect(&["d", &b.id]).await;
    wait_until(|| b.session.presence().is_none()).await;
    assert_eq!(rooms.client_count(), 1);

    // The session can open a new room socket.
    let (conn, _peer) = pair();
    rooms
        .join(1, conn, &ip(2), Some(&token(2)))
        .await
        .expect("session should be free again");
}

#[tokio::test]
async fn test_session_disconnect_closes_room_socket() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;

    b.session_peer.hang_up();
    a.expect(&["d", &b.id]).await;
    wait_until(|| rooms.client_count() == 1).await;
}

#[tokio::test]
async fn test_switch_room_moves_client() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    let mut c = Player::enter(&rooms, &services, 3, 2).await;
    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;
    b.expect(&["c", &a.id, &uuid(1), "0", "1", "null"]).await;
    b.expect(&["m", &a.id, "0", "0"]).await;
    b.expect(&["spd", &a.id, "0"]).await;

    a.send(&[&["m", "4", "4"]]);
    b.expect(&["m", &a.id, "4", "4"]).await;

    a.send(&[&["sr", "2"]]);
    b.expect(&["d", &a.id]).await;
    assert_eq!(a.expect_handshake().await, a.key);
    a.expect(&["c", &c.id, &uuid(3), "0", "1", "null"]).await;
    a.expect(&["m", &c.id, "0", "0"]).await;
    a.expect(&["spd", &c.id, "0"]).await;
    c.expect(&["c", &a.id, &uuid(1), "0", "1", "null"]).await;

    // State was reset; the counter carries on.
    let state = a.client.state();
    assert_eq!((state.x, state.y), (0, 0));
    assert_eq!(state.map_id, "0002");
    a.send(&[&["m", "1", "1"]]);
    c.expect(&["m", &a.id, "1", "1"]).await;
    b.assert_silent().await;
}

#[tokio::test]
async fn test_switch_room_unknown_room_keeps_client() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;

    a.send(&[&["sr", "99"]]);
    a.assert_silent().await;
    assert_eq!(a.client.room().id(), RoomId(1));
}

#[tokio::test]
async fn test_shutdown_closes_room_sockets() {
    let (rooms, services) = setup();
    let mut a = Player::enter(&rooms, &services, 1, 1).await;

    rooms.shutdown();
    let frame = tokio::time::timeout(Duration::from_secs(1), a.room_peer.recv())
        .await
        .expect("close should arrive");
    assert_eq!(frame, Some(Frame::Close(CLOSE_CODE)));
}

// =========================================================================
// Triggers, minigames, vending machines
// =========================================================================

#[tokio::test]
async fn test_switch_condition_unlocks_tag_once() {
    let condition = Condition {
        condition_id: "lamp".to_string(),
        map: 1,
        switch_id: 10,
        switch_value: true,
        ..Condition::default()
    };
    let (rooms, services) = setup_with(config(), vec![condition]);
    let mut a = Player::join(&rooms, &services, 1, 1).await;

    a.send(&[&["ident"]]);
    a.expect(&["ss", "10", "2"]).await;

    a.send(&[&["ss", "10", "1"]]);
    a.expect(&["b"]).await;
    assert_eq!(services.tags_of(&uuid(1)), vec!["lamp".to_string()]);

    // Unchanged value: no evaluation.
    a.send(&[&["ss", "10", "1"]]);
    a.assert_silent().await;
}

#[tokio::test]
async fn test_previous_map_trigger_unlocks_tag() {
    let condition = Condition {
        condition_id: "return".to_string(),
        map: 1,
        trigger: "prevMap".to_string(),
        value: "0003".to_string(),
        ..Condition::default()
    };
    let (rooms, services) = setup_with(config(), vec![condition]);
    let mut a = Player::enter(&rooms, &services, 1, 1).await;

    a.session_peer.send("ploc\u{FFFF}0004\u{FFFF}");
    a.assert_silent().await;

    a.session_peer.send("ploc\u{FFFF}0003\u{FFFF}");
    a.expect(&["b"]).await;
    assert_eq!(a.client.state().prev_map_id, "0003");
}

#[tokio::test]
async fn test_minigame_score_written_when_beaten() {
    let config = RoomsConfig {
        minigames: vec![MinigameConfig {
            room: 1,
            minigame_id: "snake".to_string(),
            var_id: 20,
            initial_var_sync: false,
        }],
        ..config()
    };
    let (rooms, services) = setup_with(config, Vec::new());
    services.set_minigame_score(&uuid(1), "snake", 5);
    let mut a = Player::join(&rooms, &services, 1, 1).await;

    a.send(&[&["ident"]]);
    a.expect(&["sv", "20", "1"]).await;

    a.send(&[&["sv", "20", "3"]]);
    a.send(&[&["sv", "20", "9"]]);
    wait_until(|| services.minigame_score_of(&uuid(1), "snake") == Some(9)).await;
    assert_eq!(a.client.state().minigame_scores, vec![9]);
}

#[tokio::test]
async fn test_vending_machine_offered_in_its_room() {
    let config = RoomsConfig {
        vending_machines: HashMap::from([(1, vec![7, 8])]),
        ..config()
    };
    let (rooms, services) = setup_with(config, Vec::new());
    services.set_vending_machine(Some(VendingMachine {
        map_id: 1,
        event_id: 7,
    }));

    let mut a = Player::join(&rooms, &services, 1, 1).await;
    a.send(&[&["ident"]]);
    a.expect(&["sev", "7", "1"]).await;

    let mut b = Player::join(&rooms, &services, 2, 2).await;
    b.send(&[&["ident"]]);
    b.assert_silent().await;
}

#[tokio::test]
async fn test_minigame_score_lookup_failure_counts_as_zero() {
    let config = RoomsConfig {
        minigames: vec![MinigameConfig {
            room: 1,
            minigame_id: "snake".to_string(),
            var_id: 20,
            initial_var_sync: true,
        }],
        ..config()
    };
    let (rooms, services) = setup_with(config, Vec::new());
    services.fail("minigame_score");
    let mut a = Player::join(&rooms, &services, 1, 1).await;

    a.send(&[&["ident"]]);
    a.expect(&["sv", "20", "2"]).await;
    wait_until(|| a.client.state().minigame_scores == vec![0]).await;

    // Any positive value now beats the stored score.
    a.send(&[&["sv", "20", "1"]]);
    wait_until(|| services.minigame_score_of(&uuid(1), "snake") == Some(1)).await;
}

#[tokio::test]
async fn test_join_tag_lookup_failure_still_joins() {
    let (rooms, services) = setup();
    services.fail("player_tags");
    let mut a = Player::enter(&rooms, &services, 1, 1).await;
    let mut b = Player::enter(&rooms, &services, 2, 1).await;
    assert!(a.client.state().tags.is_empty());

    a.expect(&["c", &b.id, &uuid(2), "0", "1", "null"]).await;
    b.send(&[&["m", "2", "3"]]);
    a.expect(&["m", &b.id, "2", "3"]).await;
}
