//! The session registry: every connected player identity, by uuid.
//!
//! [`Sessions`] admits new session sockets, enforces one session per uuid,
//! hands out dense client ids and tears sessions down again. It is built
//! once at startup and shared behind an `Arc`.
//!
//! # Admission
//!
//! ```text
//! identify ──→ banned? ──→ admit (under lock) ──→ load game data ──→ spawn link
//!                            │ supersede same uuid (old id kept until its cleanup)
//!                            │ per-IP limit
//!                            │ smallest free id
//!                            └ register
//! ```
//!
//! Everything inside `admit` runs under one mutex, so two connections for
//! the same uuid or IP cannot interleave their checks.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use duet_protocol::{ClientId, Rank};
use duet_transport::{spawn_link, Cancel, Connection, Outbox, WriteMode};
use parking_lot::Mutex;

use crate::logging::{access_log, error_log};
use crate::services::Services;
use crate::{Identity, SessionClient, SessionConfig, SessionError};

/// Log scope of the session socket.
pub(crate) const SCOPE: &str = "sess";

/// Tracks which client ids are in use.
#[derive(Debug, Default)]
struct IdPool {
    used: BTreeSet<u16>,
}

impl IdPool {
    /// Takes the smallest free id below [`ClientId::MAX`].
    fn allocate(&mut self) -> Option<ClientId> {
        let mut candidate = 0u16;
        for &used in &self.used {
            if used != candidate {
                break;
            }
            candidate += 1;
        }
        if candidate >= ClientId::MAX {
            return None;
        }
        self.used.insert(candidate);
        Some(ClientId(candidate))
    }

    fn release(&mut self, id: ClientId) {
        self.used.remove(&id.0);
    }
}

/// Registry of all live sessions.
pub struct Sessions<S> {
    clients: DashMap<String, Arc<SessionClient>>,
    admission: Mutex<IdPool>,
    services: Arc<S>,
    config: SessionConfig,
}

impl<S: Services> Sessions<S> {
    pub fn new(services: Arc<S>, config: SessionConfig) -> Self {
        Self {
            clients: DashMap::new(),
            admission: Mutex::new(IdPool::default()),
            services,
            config,
        }
    }

    pub fn services(&self) -> &Arc<S> {
        &self.services
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolves who a connection belongs to.
    ///
    /// A token that matches an account wins. Otherwise the player gets the
    /// anonymous identity of their IP.
    pub async fn identify(&self, ip: &str, token: Option<&str>) -> Result<Identity, SessionError> {
        if let Some(token) = token {
            if let Some(account) = self.services.account_by_token(token).await? {
                let medals = match self.services.medals(&account.uuid).await {
                    Ok(medals) => medals,
                    Err(e) => {
                        error_log(&account.uuid, SCOPE, &e);
                        [0; 5]
                    }
                };
                let badge = if account.badge.is_empty() {
                    "null".to_string()
                } else {
                    account.badge
                };
                return Ok(Identity {
                    uuid: account.uuid,
                    name: account.name,
                    rank: account.rank,
                    badge,
                    account: true,
                    banned: account.banned,
                    muted: account.muted,
                    medals,
                });
            }
        }

        let player = self.services.anonymous_by_ip(ip).await?;
        Ok(Identity {
            uuid: player.uuid,
            name: String::new(),
            rank: Rank::PLAYER,
            badge: "null".to_string(),
            account: false,
            banned: player.banned,
            muted: player.muted,
            medals: [0; 5],
        })
    }

    /// Admits a session socket and starts its reader and writer.
    ///
    /// On error nothing has been sent and `conn` is dropped.
    ///
    /// # Errors
    /// - [`SessionError::Banned`]: the identity is banned
    /// - [`SessionError::TooManyConnections`]: the IP is at its limit
    /// - [`SessionError::IdSpaceExhausted`]: no client id is free
    /// - [`SessionError::Storage`]: identity lookup failed
    pub async fn connect<C: Connection>(
        self: &Arc<Self>,
        conn: C,
        ip: &str,
        token: Option<&str>,
    ) -> Result<Arc<SessionClient>, SessionError> {
        let identity = self.identify(ip, token).await?;
        if identity.banned {
            error_log(&identity.uuid, SCOPE, "player is banned");
            return Err(SessionError::Banned);
        }

        // Most players are not in a party, so a failed lookup is not logged.
        let party_id = self.services.party_id(&identity.uuid).await.ok().flatten();

        let (outbox, rx) = Outbox::channel(
            self.config.outbox_capacity,
            format!("sess:{}", identity.uuid),
        );
        let cancel = Cancel::new();
        let uuid = identity.uuid.clone();
        let client = self
            .admit(ip, identity, outbox, cancel.clone())
            .inspect_err(|e| error_log(&uuid, SCOPE, e))?;
        client.set_party_id(party_id);

        match self.services.game_data(client.uuid()).await {
            Ok(data) => client.apply_game_data(data),
            Err(e) => error_log(client.uuid(), SCOPE, &e),
        }

        let processor = {
            let sessions = Arc::clone(self);
            let client = Arc::clone(&client);
            move |data: Vec<u8>| {
                let sessions = Arc::clone(&sessions);
                let client = Arc::clone(&client);
                async move { sessions.process(&client, &data).await }
            }
        };
        let on_disconnect = {
            let sessions = Arc::clone(self);
            let client = Arc::clone(&client);
            move || async move { sessions.disconnect(&client).await }
        };
        spawn_link(
            conn,
            rx,
            cancel,
            WriteMode::Text,
            self.config.link.clone(),
            processor,
            on_disconnect,
        );

        if let Err(e) = self
            .services
            .save_game_data(client.uuid(), &client.game_data())
            .await
        {
            error_log(client.uuid(), SCOPE, &e);
        }
        access_log(client.uuid(), SCOPE, "connect");

        Ok(client)
    }

    fn admit(
        &self,
        ip: &str,
        identity: Identity,
        outbox: Outbox,
        cancel: Cancel,
    ) -> Result<Arc<SessionClient>, SessionError> {
        let mut ids = self.admission.lock();

        if let Some((_, old)) = self.clients.remove(&identity.uuid) {
            tracing::debug!(uuid = %identity.uuid, id = %old.id(), "superseding session");
            old.cancel();
            if let Some(presence) = old.take_presence() {
                presence.cancel();
            }
            // The old id stays taken until the old session's own cleanup,
            // so its room presence cannot leave under the new session's id.
        }

        let same_ip = self.clients.iter().filter(|c| c.ip() == ip).count();
        if same_ip >= self.config.max_sessions_per_ip {
            return Err(SessionError::TooManyConnections(ip.to_string()));
        }

        let id = ids.allocate().ok_or(SessionError::IdSpaceExhausted)?;
        let client = Arc::new(SessionClient::new(id, ip, identity, outbox, cancel));
        self.clients
            .insert(client.uuid().to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// Cleanup after the session link ended.
    async fn disconnect(&self, client: &Arc<SessionClient>) {
        {
            let mut ids = self.admission.lock();
            // A superseded session must not remove its successor.
            self.clients
                .remove_if(client.uuid(), |_, current| Arc::ptr_eq(current, client));
            ids.release(client.id());
        }

        if let Some(presence) = client.take_presence() {
            presence.cancel();
        }

        if let Err(e) = self
            .services
            .save_game_data(client.uuid(), &client.game_data())
            .await
        {
            error_log(client.uuid(), SCOPE, &e);
        }
        access_log(client.uuid(), SCOPE, "disconnect");
    }

    /// Queues `msg` for every session. Full outboxes drop it.
    pub fn broadcast(&self, msg: &str) {
        for client in self.clients.iter() {
            client.send(msg);
        }
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    pub fn get(&self, uuid: &str) -> Option<Arc<SessionClient>> {
        self.clients.get(uuid).map(|c| Arc::clone(c.value()))
    }

    /// Cancels every session. Their cleanup runs on their own tasks.
    pub fn shutdown(&self) {
        for client in self.clients.iter() {
            client.cancel();
        }
    }
}
