//! `arena_client`
//!
//! Client-side systems:
//! - Connection management and the `hello` handshake
//! - Local avatar movement relative to facing
//! - Roster of remote players driven by relay events
//! - Client-local health and ability cooldowns

pub mod avatar;
pub mod client;
pub mod roster;

pub use client::ArenaClient;
