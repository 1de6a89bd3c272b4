//! Connection lifecycle shared by the session and room sockets.
//!
//! Every accepted connection runs as a *link*: two Tokio tasks sharing one
//! [`Cancel`] handle.
//!
//! ```text
//!            ┌──────── reader ────────┐        ┌──────── writer ────────┐
//! socket ──→ │ recv (pong deadline)   │        │ select!                │ ──→ socket
//!            │   └→ processor(data)   │        │   cancel  → close frame│
//!            └───────────┬────────────┘        │   outbox  → frame      │
//!                        │ exit                │   ticker  → ping       │
//!                        ▼                     └───────────┬────────────┘
//!                     cancel ─────────────────────────────→│ exit
//!                                                          ▼
//!                                                   on_disconnect()
//! ```
//!
//! The reader awaits the processor before reading the next frame, so
//! messages of one connection are handled strictly one at a time, in
//! arrival order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{Cancel, Connection, Frame, Inbound, CLOSE_CODE};

/// Coalescing stops once the buffer is within this many bytes of the
/// maximum frame size.
pub const COALESCE_HEADROOM: usize = 256;

/// Timing and size limits of a link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long the reader waits for a pong before dropping the peer.
    pub pong_wait: Duration,
    /// Interval between keepalive pings. Must be shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Upper bound for a single write (including the close frame).
    pub write_wait: Duration,
    /// Largest frame the writer builds when coalescing.
    pub max_frame_size: usize,
}

impl LinkConfig {
    /// Derives the ping period as 9/10 of `pong_wait`.
    pub fn with_pong_wait(pong_wait: Duration) -> Self {
        Self {
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            ..Self::default()
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            write_wait: Duration::from_secs(10),
            max_frame_size: 4096,
        }
    }
}

/// How the writer turns queued messages into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// One text frame per message.
    Text,
    /// Drain as many queued messages as fit into one binary frame, joined
    /// by `delimiter`.
    Coalesced {
        /// Separator placed between messages.
        delimiter: &'static str,
    },
}

/// Producer side of a connection's bounded outbound queue.
///
/// Cloning is cheap. [`push`](Self::push) never waits: a full queue drops the
/// message, so one slow client cannot stall a broadcast.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<String>,
    label: Arc<str>,
}

impl Outbox {
    /// Creates an outbox with room for `capacity` messages. `label` names
    /// the owner in drop warnings.
    pub fn channel(
        capacity: usize,
        label: impl Into<Arc<str>>,
    ) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                label: label.into(),
            },
            rx,
        )
    }

    /// Queues a message. Returns `false` if it was dropped.
    pub fn push(&self, msg: impl Into<String>) -> bool {
        match self.tx.try_send(msg.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    target: "duet::error",
                    outbox = %self.label,
                    "send channel is full"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!(outbox = %self.label, "outbox closed");
                false
            }
        }
    }

    /// Returns `true` once the writer is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Starts the reader and writer tasks for `conn`.
///
/// `processor` receives every data frame. `on_disconnect` runs once, after
/// both tasks have stopped. The returned handle completes after
/// `on_disconnect` finishes.
pub fn spawn_link<C, P, PF, D, DF>(
    conn: C,
    outbox: mpsc::Receiver<String>,
    cancel: Cancel,
    mode: WriteMode,
    config: LinkConfig,
    processor: P,
    on_disconnect: D,
) -> JoinHandle<()>
where
    C: Connection,
    P: FnMut(Vec<u8>) -> PF + Send + 'static,
    PF: Future<Output = ()> + Send + 'static,
    D: FnOnce() -> DF + Send + 'static,
    DF: Future<Output = ()> + Send + 'static,
{
    let conn = Arc::new(conn);
    let id = conn.id();

    let reader = tokio::spawn(read_pump(
        Arc::clone(&conn),
        cancel.clone(),
        config.pong_wait,
        processor,
    ));

    tokio::spawn(async move {
        write_pump(conn, outbox, cancel.clone(), mode, &config).await;
        cancel.cancel();
        if let Err(e) = reader.await {
            tracing::error!(%id, error = %e, "reader task failed");
        }
        on_disconnect().await;
        tracing::debug!(%id, "link closed");
    })
}

async fn read_pump<C, P, PF>(
    conn: Arc<C>,
    cancel: Cancel,
    pong_wait: Duration,
    mut processor: P,
) where
    C: Connection,
    P: FnMut(Vec<u8>) -> PF + Send + 'static,
    PF: Future<Output = ()> + Send + 'static,
{
    let id = conn.id();
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = tokio::time::timeout_at(deadline, conn.recv()) => next,
        };

        match next {
            Ok(Ok(Some(Inbound::Data(data)))) => processor(data).await,
            Ok(Ok(Some(Inbound::Pong))) => {
                deadline = Instant::now() + pong_wait;
            }
            Ok(Ok(None)) => {
                tracing::debug!(%id, "connection closed by peer");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::debug!(%id, "read deadline expired");
                break;
            }
        }
    }

    cancel.cancel();
}

async fn write_pump<C: Connection>(
    conn: Arc<C>,
    mut outbox: mpsc::Receiver<String>,
    cancel: Cancel,
    mode: WriteMode,
    config: &LinkConfig,
) {
    let id = conn.id();
    let mut ticker = tokio::time::interval_at(
        Instant::now() + config.ping_period,
        config.ping_period,
    );

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let close = conn.send(Frame::Close(CLOSE_CODE));
                let _ = tokio::time::timeout(config.write_wait, close).await;
                return;
            }
            msg = outbox.recv() => match msg {
                Some(msg) => match mode {
                    WriteMode::Text => Frame::Text(msg),
                    WriteMode::Coalesced { delimiter } => Frame::Binary(
                        coalesce(msg, &mut outbox, delimiter, config.max_frame_size)
                            .into_bytes(),
                    ),
                },
                None => return,
            },
            _ = ticker.tick() => Frame::Ping,
        };

        match tokio::time::timeout(config.write_wait, conn.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(%id, error = %e, "write failed");
                return;
            }
            Err(_) => {
                tracing::debug!(%id, "write deadline expired");
                return;
            }
        }
    }
}

/// Appends already-queued messages to `first` until the buffer gets close
/// to `max_frame_size`.
pub(crate) fn coalesce(
    first: String,
    outbox: &mut mpsc::Receiver<String>,
    delimiter: &str,
    max_frame_size: usize,
) -> String {
    let mut buf = first;
    while buf.len() <= max_frame_size.saturating_sub(COALESCE_HEADROOM) {
        match outbox.try_recv() {
            Ok(next) => {
                buf.push_str(delimiter);
                buf.push_str(&next);
            }
            Err(_) => break,
        }
    }
    buf
}
