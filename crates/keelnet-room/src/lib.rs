//! Room assignment (matchmaking) for Keelnet.
//!
//! Once a connection logs in, its user is handed to the [`MatchMaker`],
//! which drops them into the first room with a free slot and creates a new
//! room when every existing one is full.
//!
//! # Key types
//!
//! - [`MatchMaker`]: enter/exit users, serialized by a single lock
//! - [`Room`]: bounded member list with a creation-ordered number
//! - [`RoomDirectory`]: user → room, at most one entry per user
//! - [`RoomConfig`]: room capacity

mod config;
mod error;
mod manager;
mod room;

pub use config::RoomConfig;
pub use error::RoomError;
pub use manager::MatchMaker;
pub use room::{Room, RoomDirectory, RoomSummary};
