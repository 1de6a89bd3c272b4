//! Integration tests for the Duet server over real WebSockets.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use duet::prelude::*;
use duet_protocol::{join_fields, sign_frame, FIELD_DELIM, MESSAGE_DELIM};
use duet_session::Account;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const SIGN_KEY: &str = "integration";

// =========================================================================
// Helpers
// =========================================================================

struct TestServer {
    addr: String,
    services: Arc<MemoryServices>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), DuetError>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let services = Arc::new(MemoryServices::new());
        let server = DuetServer::bind(&config, Arc::clone(&services))
            .await
            .expect("server should bind");
        let addr = server.local_addr().expect("bound address").to_string();

        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(server.run(async move {
            let _ = stopped.await;
        }));

        TestServer {
            addr,
            services,
            stop: Some(stop),
            task,
        }
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task
            .await
            .expect("server task should not panic")
            .expect("server should stop cleanly");
    }

    /// Registers account `n` and returns its token.
    fn account(&self, n: u32) -> String {
        let token = format!("{n:0>32}");
        self.services.add_account(
            token.clone(),
            Account {
                uuid: uuid(n),
                name: String::new(),
                rank: Rank::PLAYER,
                badge: String::new(),
                banned: false,
                muted: false,
            },
        );
        token
    }

    async fn connect(&self, path_and_query: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}{path_and_query}", self.addr))
            .await
            .expect("client should connect");
        ws
    }
}

fn config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        sign_key: SIGN_KEY.to_string(),
        max_room_id: 10,
        conditions_dir: "no-such-conditions-dir".into(),
        ..ServerConfig::default()
    }
}

fn uuid(n: u32) -> String {
    format!("player-{n}")
}

/// Next data message, skipping keepalives. `None` once the server closed.
async fn next_message(ws: &mut ClientWs) -> Option<Message> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("server should answer");
        match msg {
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(msg)) => return Some(msg),
            _ => return None,
        }
    }
}

async fn next_text(ws: &mut ClientWs) -> String {
    match next_message(ws).await {
        Some(Message::Text(text)) => text.as_str().to_string(),
        other => panic!("expected text, got {other:?}"),
    }
}

/// Asserts the server ends the connection with close code 1028.
async fn expect_closed(ws: &mut ClientWs) {
    match next_message(ws).await {
        Some(Message::Close(Some(frame))) => assert_eq!(u16::from(frame.code), 1028),
        None => {}
        other => panic!("expected close, got {other:?}"),
    }
}

/// Asserts the server ended the connection, with any close code.
async fn expect_ended(ws: &mut ClientWs) {
    match next_message(ws).await {
        Some(Message::Close(_)) | None => {}
        other => panic!("expected the connection to end, got {other:?}"),
    }
}

/// A room socket that signs frames like the game client.
struct RoomSocket {
    ws: ClientWs,
    key: u32,
    counter: u32,
    id: String,
    inbox: VecDeque<String>,
}

impl RoomSocket {
    async fn open(server: &TestServer, room: u32, token: &str) -> Self {
        let ws = server.connect(&format!("/room?id={room}&token={token}")).await;
        let mut socket = RoomSocket {
            ws,
            key: 0,
            counter: 0,
            id: String::new(),
            inbox: VecDeque::new(),
        };
        let handshake = socket.next().await;
        let fields: Vec<_> = handshake.split(FIELD_DELIM).collect();
        assert_eq!(fields[0], "s");
        socket.id = fields[1].to_string();
        socket.key = fields[2].parse().expect("numeric key");
        socket
    }

    async fn send(&mut self, fields: &[&str]) {
        self.counter += 1;
        let frame = sign_frame(
            self.key,
            SIGN_KEY.as_bytes(),
            self.counter,
            join_fields(fields).as_bytes(),
        );
        self.ws
            .send(Message::binary(frame))
            .await
            .expect("room send");
    }

    async fn next(&mut self) -> String {
        loop {
            if let Some(msg) = self.inbox.pop_front() {
                return msg;
            }
            match next_message(&mut self.ws).await {
                Some(Message::Binary(data)) => {
                    let text = String::from_utf8(data.to_vec()).expect("UTF-8 frame");
                    self.inbox
                        .extend(text.split(MESSAGE_DELIM).map(str::to_string));
                }
                other => panic!("expected binary, got {other:?}"),
            }
        }
    }
}

// =========================================================================
// Session socket
// =========================================================================

#[tokio::test]
async fn test_session_info_round_trip() {
    let server = TestServer::start(config()).await;
    let token = server.account(1);
    let mut ws = server.connect(&format!("/session?token={token}")).await;

    ws.send(Message::text("i")).await.unwrap();
    assert_eq!(
        next_text(&mut ws).await,
        join_fields(&["i", &uuid(1), "0", "1", "null", "0", "0", "0", "0", "0"])
    );
    server.shutdown().await;
}

#[tokio::test]
async fn test_idle_socket_does_not_block_accept() {
    let server = TestServer::start(config()).await;
    let token = server.account(1);

    // Connected but never upgraded.
    let _idle = tokio::net::TcpStream::connect(&server.addr).await.unwrap();

    let mut ws = tokio::time::timeout(
        Duration::from_secs(5),
        server.connect(&format!("/session?token={token}")),
    )
    .await
    .expect("second client should be accepted");
    ws.send(Message::text("i")).await.unwrap();
    assert!(next_text(&mut ws).await.starts_with("i"));
    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_session_frame_ends_connection() {
    let server = TestServer::start(config()).await;
    let token = server.account(1);
    let mut ws = server.connect(&format!("/session?token={token}")).await;

    // The server may hang up before the whole frame is written.
    let _ = ws.send(Message::text("x".repeat(8 << 20))).await;
    expect_ended(&mut ws).await;

    let mut again = server.connect(&format!("/session?token={token}")).await;
    again.send(Message::text("i")).await.unwrap();
    assert!(next_text(&mut again).await.starts_with("i"));
    server.shutdown().await;
}

#[tokio::test]
async fn test_presence_count_broadcast() {
    let server = TestServer::start(ServerConfig {
        presence_interval_secs: 1,
        ..config()
    })
    .await;
    let token = server.account(1);
    let mut ws = server.connect(&format!("/session?token={token}")).await;

    assert_eq!(next_text(&mut ws).await, join_fields(&["pc", "1"]));
    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_path_closed() {
    let server = TestServer::start(config()).await;
    let mut ws = server.connect("/lobby").await;

    expect_closed(&mut ws).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let server = TestServer::start(config()).await;
    let token = server.account(1);
    let mut ws = server.connect(&format!("/session?token={token}")).await;
    ws.send(Message::text("i")).await.unwrap();
    next_text(&mut ws).await;

    server.shutdown().await;
    expect_closed(&mut ws).await;
}

// =========================================================================
// Room socket
// =========================================================================

#[tokio::test]
async fn test_room_without_session_closed() {
    let server = TestServer::start(config()).await;
    let token = server.account(1);
    let mut ws = server.connect(&format!("/room?id=1&token={token}")).await;

    expect_closed(&mut ws).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_two_players_see_each_other() {
    let server = TestServer::start(config()).await;
    let token_a = server.account(1);
    let token_b = server.account(2);

    let _session_a = server.connect(&format!("/session?token={token_a}")).await;
    let _session_b = server.connect(&format!("/session?token={token_b}")).await;
    // Sessions are admitted asynchronously after the upgrade.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut a = RoomSocket::open(&server, 1, &token_a).await;
    a.send(&["ident"]).await;
    a.send(&["m", "5", "6"]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut b = RoomSocket::open(&server, 1, &token_b).await;
    b.send(&["ident"]).await;

    let a_id = a.id.clone();
    assert_eq!(b.next().await, join_fields(&["c", &a_id, &uuid(1), "0", "1", "null"]));
    assert_eq!(b.next().await, join_fields(&["m", &a_id, "5", "6"]));
    assert_eq!(b.next().await, join_fields(&["spd", &a_id, "0"]));
    assert_eq!(
        a.next().await,
        join_fields(&["c", &b.id, &uuid(2), "0", "1", "null"])
    );

    b.send(&["say", "hi"]).await;
    assert_eq!(b.next().await, join_fields(&["say", &b.id, "hi"]));
    assert_eq!(a.next().await, join_fields(&["say", &b.id, "hi"]));

    server.shutdown().await;
}
