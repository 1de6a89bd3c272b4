//! `DuetServer`: accept loop, socket routing and the presence counter.
//!
//! This ties the layers together: transport → protocol → session → room.
//! Every accepted socket is routed by its upgrade path to either the
//! session registry or the room registry, which own it from then on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use duet_protocol::{message, MAX_FRAME_SIZE};
use duet_room::{load_conditions, ConditionEvaluator, Rooms};
use duet_session::{Services, Sessions};
use duet_transport::{
    Cancel, Connection, ConnectRequest, PendingUpgrade, Transport, Upgrade, WebSocketConnection,
    WebSocketTransport, CLOSE_CODE,
};
use tokio::task::JoinHandle;

use crate::{DuetError, ServerConfig};

/// Shared state handed to each routing task.
struct Routes<S> {
    sessions: Arc<Sessions<S>>,
    rooms: Arc<Rooms<S>>,
    session_path: String,
    room_path: String,
}

/// A bound Duet server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DuetServer<S> {
    transport: WebSocketTransport,
    routes: Arc<Routes<S>>,
    presence_interval: Duration,
}

impl<S: Services> DuetServer<S> {
    /// Binds the listener and builds both registries.
    ///
    /// Badge conditions are read from `config.conditions_dir`.
    pub async fn bind(config: &ServerConfig, services: Arc<S>) -> Result<Self, DuetError> {
        let conditions = load_conditions(&config.conditions_dir)?;
        tracing::info!(count = conditions.len(), "conditions loaded");

        let sessions = Arc::new(Sessions::new(services, config.session_config()));
        let evaluator = Arc::new(ConditionEvaluator::new(config.game_name.clone()));
        let rooms = Arc::new(Rooms::new(
            Arc::clone(&sessions),
            config.rooms_config()?,
            conditions,
            evaluator,
        ));

        let transport = WebSocketTransport::bind(&config.bind_addr)
            .await?
            .trust_forwarded_for(config.trust_forwarded_for)
            .handshake_timeout(config.handshake_timeout())
            .max_message_size(MAX_FRAME_SIZE);

        Ok(Self {
            transport,
            routes: Arc::new(Routes {
                sessions,
                rooms,
                session_path: config.session_path.clone(),
                room_path: config.room_path.clone(),
            }),
            presence_interval: config.presence_interval(),
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    pub fn sessions(&self) -> &Arc<Sessions<S>> {
        &self.routes.sessions
    }

    pub fn rooms(&self) -> &Arc<Rooms<S>> {
        &self.routes.rooms
    }

    /// Runs the accept loop until `shutdown` resolves, then closes every
    /// connection.
    pub async fn run(mut self, shutdown: impl Future<Output = ()> + Send) -> Result<(), DuetError> {
        tracing::info!("Duet server running");

        let stop = Cancel::new();
        let presence = spawn_presence_count(
            Arc::clone(&self.routes.sessions),
            self.presence_interval,
            stop.clone(),
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let routes = Arc::clone(&self.routes);
                        tokio::spawn(async move { routes.upgrade_and_route(pending).await });
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down");
        stop.cancel();
        self.routes.rooms.shutdown();
        self.routes.sessions.shutdown();
        self.transport.shutdown().await?;
        if let Err(e) = presence.await {
            tracing::error!(error = %e, "presence task failed");
        }
        Ok(())
    }
}

impl<S: Services> Routes<S> {
    async fn upgrade_and_route(&self, pending: PendingUpgrade) {
        let addr = pending.peer_addr();
        match pending.upgrade().await {
            Ok((conn, request)) => self.route(conn, request).await,
            Err(e) => tracing::debug!(%addr, error = %e, "upgrade failed"),
        }
    }

    /// Hands a new socket to the registry its path names. Admission errors
    /// were logged by the registry; the socket is simply dropped.
    async fn route(&self, conn: WebSocketConnection, request: ConnectRequest) {
        let token = request.token();

        if request.path == self.session_path {
            let _ = self.sessions.connect(conn, &request.ip, token).await;
        } else if request.path == self.room_path {
            match request.room_id() {
                Some(room_id) => {
                    let _ = self.rooms.join(room_id, conn, &request.ip, token).await;
                }
                None => reject(conn, &request, "missing room id").await,
            }
        } else {
            reject(conn, &request, "unknown path").await;
        }
    }
}

async fn reject(conn: WebSocketConnection, request: &ConnectRequest, reason: &str) {
    tracing::debug!(path = %request.path, ip = %request.ip, reason, "rejecting connection");
    if let Err(e) = conn.close(CLOSE_CODE).await {
        tracing::debug!(error = %e, "close failed");
    }
}

/// Broadcasts `pc|count` to every session whenever the number of sessions
/// changed since the last tick.
pub fn spawn_presence_count<S: Services>(
    sessions: Arc<Sessions<S>>,
    interval: Duration,
    stop: Cancel,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut last = 0;
        loop {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = ticker.tick() => {
                    let count = sessions.count();
                    if count != last {
                        sessions.broadcast(&message!("pc", count));
                        last = count;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_session::{MemoryServices, SessionConfig};
    use duet_transport::memory::pair;
    use duet_transport::Frame;

    #[tokio::test(start_paused = true)]
    async fn test_presence_count_broadcasts_on_change_only() {
        let services = Arc::new(MemoryServices::new());
        let sessions = Arc::new(Sessions::new(services, SessionConfig::default()));
        let (conn, mut peer) = pair();
        sessions.connect(conn, "10.0.0.1", None).await.unwrap();

        let stop = Cancel::new();
        let task = spawn_presence_count(Arc::clone(&sessions), Duration::from_secs(5), stop.clone());

        assert_eq!(peer.recv().await, Some(Frame::Text(message!("pc", 1usize))));

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(peer.try_recv(), None);

        stop.cancel();
        task.await.unwrap();
    }
}
