//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;

use crate::request::client_ip;
use crate::{
    ConnectRequest, Connection, ConnectionId, Frame, Inbound, Transport,
    TransportError, Upgrade,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// Default bound on the HTTP upgrade after the TCP accept.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on an inbound message and on any single frame of it.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// [`accept`](Transport::accept) only takes the TCP connection; the upgrade
/// runs in [`Upgrade::upgrade`], so callers can move it off the
/// accept loop.
pub struct WebSocketTransport {
    listener: TcpListener,
    trust_forwarded_for: bool,
    handshake_timeout: Duration,
    max_message_size: usize,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            trust_forwarded_for: false,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        })
    }

    /// Use the first `X-Forwarded-For` hop as the client address.
    /// Only enable this behind a reverse proxy that sets the header.
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// How long a client may take to complete the upgrade.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Largest inbound message. Longer messages end the connection before
    /// their payload is buffered.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Pending = PendingUpgrade;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<PendingUpgrade, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        Ok(PendingUpgrade {
            stream,
            addr,
            trust_forwarded_for: self.trust_forwarded_for,
            timeout: self.handshake_timeout,
            config: WebSocketConfig::default()
                .max_message_size(Some(self.max_message_size))
                .max_frame_size(Some(self.max_message_size)),
        })
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// An accepted TCP connection that has not completed the WebSocket upgrade.
pub struct PendingUpgrade {
    stream: TcpStream,
    addr: SocketAddr,
    trust_forwarded_for: bool,
    timeout: Duration,
    config: WebSocketConfig,
}

impl PendingUpgrade {
    /// The peer's socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn handshake(self) -> Result<(WebSocketConnection, ConnectRequest), TransportError> {
        let (req_tx, req_rx) = oneshot::channel();
        let callback = move |req: &Request,
                             mut resp: Response|
              -> Result<Response, ErrorResponse> {
            let target = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| req.uri().path().to_string());
            let forwarded = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            // Browsers refuse the upgrade unless the requested subprotocol
            // is echoed back.
            if let Some(proto) = req.headers().get("sec-websocket-protocol") {
                resp.headers_mut()
                    .insert("sec-websocket-protocol", proto.clone());
            }
            let _ = req_tx.send((target, forwarded));
            Ok(resp)
        };

        let ws = tokio_tungstenite::accept_hdr_async_with_config(
            self.stream,
            callback,
            Some(self.config),
        )
        .await
        .map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let (target, forwarded) = req_rx.await.map_err(|_| {
            TransportError::BadRequest("upgrade request not captured".into())
        })?;
        let forwarded = forwarded.filter(|_| self.trust_forwarded_for);
        let ip = client_ip(forwarded.as_deref(), &self.addr.ip().to_string());
        let request = ConnectRequest::parse(&target, ip);

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, addr = %self.addr, path = %request.path, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok((
            WebSocketConnection {
                id,
                sink: Mutex::new(sink),
                stream: Mutex::new(stream),
            },
            request,
        ))
    }
}

impl Upgrade for PendingUpgrade {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn upgrade(self) -> Result<(WebSocketConnection, ConnectRequest), TransportError> {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.handshake())
            .await
            .map_err(|_| TransportError::DeadlineExpired("handshake"))?
    }
}

/// A single WebSocket connection.
///
/// The socket is split so the reader task can block in `recv` while the
/// writer task sends.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

fn send_failed(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> TransportError {
    TransportError::SendFailed(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        e,
    ))
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, frame: Frame) -> Result<(), Self::Error> {
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Ping => Message::Ping(Vec::new().into()),
            Frame::Close(code) => Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: String::new().into(),
            })),
        };
        self.sink.lock().await.send(msg).await.map_err(send_failed)
    }

    async fn recv(&self) -> Result<Option<Inbound>, Self::Error> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Inbound::Data(data.to_vec())));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Inbound::Data(
                        text.as_str().as_bytes().to_vec(),
                    )));
                }
                Some(Ok(Message::Pong(_))) => return Ok(Some(Inbound::Pong)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping (auto-answered) / raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self, code: u16) -> Result<(), Self::Error> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: String::new().into(),
        })))
        .await
        .map_err(send_failed)?;
        sink.close().await.map_err(send_failed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
