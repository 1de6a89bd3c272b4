//! Player sessions for Duet.
//!
//! This crate handles the long-lived half of the dual-socket client model:
//!
//! 1. **Identity**: resolving who a connection belongs to (token or IP)
//! 2. **Session tracking**: one live [`SessionClient`] per uuid in the
//!    [`Sessions`] registry, with dense reusable client ids
//! 3. **Session messages**: chat, names, parties, events
//! 4. **Collaborators**: the [`PlayerStore`], [`SocialGraph`] and
//!    [`EventBoard`] traits, plus [`MemoryServices`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)     ← binds a RoomPresence to a SessionClient
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol + Transport (below)
//! ```

mod error;
mod handlers;
pub mod logging;
mod manager;
mod memory;
mod services;
mod session;

pub use error::SessionError;
pub use handlers::{chat_text, MAX_CHAT_LEN, MAX_NAME_LEN};
pub use manager::Sessions;
pub use memory::MemoryServices;
pub use services::{
    Account, AnonymousPlayer, EventBoard, EventLocation, EventPeriod, Friend, GameData, Medals,
    Party, PartyMember, PlayerStore, Services, SocialGraph, StoreError, VendingMachine,
};
pub use session::{
    BoxFuture, Identity, PresenceLocation, Profile, RoomPresence, SessionClient, SessionConfig,
};
