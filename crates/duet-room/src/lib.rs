//! Rooms for Duet.
//!
//! A room is one game map. Players reach it over a second socket that rides
//! on their session:
//!
//! - [`Rooms`]: the registry of every room; admits room sockets, verifies
//!   signed frames and routes messages
//! - [`Room`]: one map, its clients and broadcast rules
//! - [`RoomClient`]: one player's replicated state in a room
//! - [`TriggerEvaluator`]: badge conditions checked against what players do
//!
//! Rooms are created once from [`RoomsConfig`] and live as long as the
//! server.

mod client;
mod config;
mod error;
mod handlers;
mod manager;
mod room;
mod trigger;

pub use client::{ClientState, Picture, RoomClient, MAX_PICTURES};
pub use config::{MinigameConfig, RoomsConfig};
pub use error::RoomError;
pub use manager::Rooms;
pub use room::Room;
pub use trigger::{
    load_conditions, Condition, ConditionEvaluator, PlayerContext, SyncCommand,
    TriggerEvaluator, TIME_TRIAL_GAME, TIME_TRIAL_SWITCH,
};
