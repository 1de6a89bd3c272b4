//! # Duet
//!
//! Real-time backend for a multiplayer game overlay.
//!
//! Every player holds two WebSockets: a long-lived *session* socket that
//! carries identity, chat and parties across maps, and a *room* socket for
//! the map they stand in. This crate is the server that ties the layers
//! together:
//!
//! ```text
//! duet-transport → duet-protocol → duet-session → duet-room
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use duet::prelude::*;
//!
//! # async fn run() -> Result<(), DuetError> {
//! let config = ServerConfig::load()?;
//! let server = DuetServer::bind(&config, Arc::new(MemoryServices::new())).await?;
//! server.run(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

mod config;
mod error;
mod server;

pub use config::{ServerConfig, CONFIG_ENV, DEFAULT_CONFIG_FILE};
pub use error::DuetError;
pub use server::{spawn_presence_count, DuetServer};

/// Re-exports of commonly used types from all Duet crates.
pub mod prelude {
    pub use crate::{DuetError, DuetServer, ServerConfig};

    pub use duet_protocol::{ClientId, ProtocolError, Rank, RoomId};
    pub use duet_room::{
        Condition, ConditionEvaluator, RoomError, Rooms, RoomsConfig, TriggerEvaluator,
    };
    pub use duet_session::{
        EventBoard, MemoryServices, PlayerStore, Services, SessionConfig, SessionError,
        Sessions, SocialGraph,
    };
    pub use duet_transport::{LinkConfig, TransportError};
}
