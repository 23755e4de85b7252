//! `arena_server`
//!
//! Session relay for the arena:
//! - Assigns every connection a fresh `PlayerId`
//! - Keeps each player's last known position
//! - Fans out joins, moves, combat and departures to the other sessions
//!
//! Networking model:
//! - TCP with length-prefixed JSON frames (see `arena_shared::net`)
//! - One coordinator task owns the registry; connections talk to it over a
//!   bounded channel

pub mod console;
pub mod relay;
pub mod server;

pub use relay::Relay;
pub use server::{RelayHandle, RelayServer};
