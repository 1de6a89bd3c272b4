//! In-process connection pair.
//!
//! [`pair`] returns a server-side [`MemoryConnection`] that implements
//! [`Connection`] and a [`MemoryPeer`] that plays the remote client. Used by
//! the session/room tests to drive the full lifecycle without sockets.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, Mutex};

use crate::{Connection, ConnectionId, Frame, Inbound, TransportError};

static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1 << 48);

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    outbound: mpsc::UnboundedSender<Frame>,
}

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<Inbound>>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

/// Creates a connected pair.
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let id = ConnectionId::new(NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed));
    (
        MemoryConnection {
            id,
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
        },
        MemoryPeer {
            tx: Some(in_tx),
            rx: out_rx,
        },
    )
}

impl MemoryPeer {
    /// Delivers a data frame to the server side. Returns `false` once the
    /// peer hung up.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> bool {
        self.push(Inbound::Data(data.into()))
    }

    /// Delivers a keepalive acknowledgement.
    pub fn pong(&self) -> bool {
        self.push(Inbound::Pong)
    }

    fn push(&self, inbound: Inbound) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.send(inbound).is_ok())
    }

    /// Simulates the client closing the socket.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    /// Waits for the next frame the server sent. `None` once the server side
    /// is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Returns the next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, frame: Frame) -> Result<(), Self::Error> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Inbound>, Self::Error> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self, code: u16) -> Result<(), Self::Error> {
        self.send(Frame::Close(code)).await
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (conn, mut peer) = pair();

        assert!(peer.send(b"hello".to_vec()));
        assert_eq!(
            conn.recv().await.unwrap(),
            Some(Inbound::Data(b"hello".to_vec()))
        );

        conn.send(Frame::Text("hi".into())).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Text("hi".into())));
    }

    #[tokio::test]
    async fn test_hang_up_reads_as_clean_close() {
        let (conn, mut peer) = pair();
        peer.hang_up();
        assert_eq!(conn.recv().await.unwrap(), None);
    }
}
