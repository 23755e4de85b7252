//! `arena_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One closed set of wire events, validated by serde at the boundary.
//! - Explicit framing so every transport read is bounded.
//! - No `unsafe`.

pub mod combat;
pub mod config;
pub mod math;
pub mod net;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::combat::*;
    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
}
