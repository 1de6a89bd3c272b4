//! Server configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working local server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use duet_room::{MinigameConfig, RoomsConfig};
use duet_session::SessionConfig;
use duet_transport::LinkConfig;
use serde::{Deserialize, Serialize};

use crate::DuetError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DUET_CONFIG";

/// Config file read from the working directory when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "duet.toml";

/// Top-level server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: String,

    /// Upgrade path of the session socket.
    pub session_path: String,

    /// Upgrade path of the room socket (`?id=<room>`).
    pub room_path: String,

    /// Game variant, e.g. `2kki`.
    pub game_name: String,

    /// Secret mixed into room frame signatures.
    pub sign_key: String,

    /// Rooms `0..=max_room_id` exist.
    pub max_room_id: u32,

    pub singleplayer_rooms: Vec<u32>,

    /// Directory of `*.json` badge conditions.
    pub conditions_dir: PathBuf,

    pub minigames: Vec<MinigameConfig>,

    /// Vending machine event ids by room. Keys are room ids; TOML table keys
    /// are always strings.
    pub vending_machines: HashMap<String, Vec<i32>>,

    pub max_sessions_per_ip: usize,

    /// Outbound queue capacity of a session socket.
    pub session_outbox: usize,

    /// Outbound queue capacity of a room socket.
    pub room_outbox: usize,

    pub pong_wait_secs: u64,

    pub write_wait_secs: u64,

    /// Time a client gets to finish the WebSocket upgrade.
    pub handshake_timeout_secs: u64,

    /// How often the online player count is checked and broadcast.
    pub presence_interval_secs: u64,

    /// Take the client address from `X-Forwarded-For`.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8028".to_string(),
            session_path: "/session".to_string(),
            room_path: "/room".to_string(),
            game_name: "2kki".to_string(),
            sign_key: String::new(),
            max_room_id: 9999,
            singleplayer_rooms: Vec::new(),
            conditions_dir: PathBuf::from("conditions"),
            minigames: Vec::new(),
            vending_machines: HashMap::new(),
            max_sessions_per_ip: 3,
            session_outbox: 8,
            room_outbox: 16,
            pong_wait_secs: 60,
            write_wait_secs: 10,
            handshake_timeout_secs: 10,
            presence_interval_secs: 5,
            trust_forwarded_for: false,
        }
    }
}

impl ServerConfig {
    /// Loads the file named by `DUET_CONFIG`, else `duet.toml` if present,
    /// else the defaults.
    pub fn load() -> Result<Self, DuetError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.exists() {
            return Self::from_file(path);
        }
        tracing::info!("no config file, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self, DuetError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, DuetError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DuetError> {
        if self.pong_wait_secs == 0 {
            return Err(DuetError::InvalidConfig("pong_wait_secs must be positive".into()));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(DuetError::InvalidConfig(
                "handshake_timeout_secs must be positive".into(),
            ));
        }
        if self.presence_interval_secs == 0 {
            return Err(DuetError::InvalidConfig(
                "presence_interval_secs must be positive".into(),
            ));
        }
        if self.session_path == self.room_path {
            return Err(DuetError::InvalidConfig(
                "session_path and room_path must differ".into(),
            ));
        }
        self.vending_machine_rooms().map(|_| ())
    }

    /// `vending_machines` keyed by parsed room id.
    fn vending_machine_rooms(&self) -> Result<HashMap<u32, Vec<i32>>, DuetError> {
        self.vending_machines
            .iter()
            .map(|(room, ids)| {
                room.parse()
                    .map(|room| (room, ids.clone()))
                    .map_err(|_| DuetError::InvalidConfig(format!("vending machine room `{room}`")))
            })
            .collect()
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            write_wait: Duration::from_secs(self.write_wait_secs),
            ..LinkConfig::with_pong_wait(Duration::from_secs(self.pong_wait_secs))
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_sessions_per_ip: self.max_sessions_per_ip,
            outbox_capacity: self.session_outbox,
            link: self.link_config(),
        }
    }

    pub fn rooms_config(&self) -> Result<RoomsConfig, DuetError> {
        Ok(RoomsConfig {
            game_name: self.game_name.clone(),
            max_room_id: self.max_room_id,
            singleplayer_rooms: self.singleplayer_rooms.clone(),
            minigames: self.minigames.clone(),
            vending_machines: self.vending_machine_rooms()?,
            secret: Arc::from(self.sign_key.as_bytes()),
            outbox_capacity: self.room_outbox,
            link: self.link_config(),
        })
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn presence_interval(&self) -> Duration {
        Duration::from_secs(self.presence_interval_secs)
    }
}
