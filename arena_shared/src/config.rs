//! Configuration system.
//!
//! Loads arena configuration from JSON strings or files. Every field has a
//! default, so a partial file only overrides what it names.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::net::DEFAULT_MAX_FRAME_LEN;

/// Root configuration shared by client/server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Server listen/connect address, e.g. `127.0.0.1:3000`.
    pub server_addr: String,
    /// Events buffered per session before the session counts as a slow
    /// consumer and is evicted.
    pub outbound_queue_capacity: usize,
    /// Requests buffered between connection tasks and the coordinator.
    pub inbound_queue_capacity: usize,
    /// Time allowed for the `hello` frame after accept.
    pub handshake_timeout_ms: u64,
    /// Largest accepted frame payload in bytes.
    pub max_frame_len: usize,
    /// Distance moved per key press (client only).
    pub player_speed: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3000".to_string(),
            outbound_queue_capacity: 256,
            inbound_queue_capacity: 1024,
            handshake_timeout_ms: 5000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            player_speed: 0.05,
        }
    }
}

impl ArenaConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Replaces the port of `server_addr`, keeping the host.
    pub fn with_port(mut self, port: u16) -> Self {
        let host = match self.server_addr.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => self.server_addr.clone(),
        };
        self.server_addr = format!("{host}:{port}");
        self
    }

    pub fn handshake_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = ArenaConfig::from_json_str(r#"{"outbound_queue_capacity": 8}"#).unwrap();
        assert_eq!(cfg.outbound_queue_capacity, 8);
        assert_eq!(cfg.server_addr, "127.0.0.1:3000");
        assert_eq!(cfg.max_frame_len, DEFAULT_MAX_FRAME_LEN);
    }

    #[test]
    fn with_port_keeps_host() {
        let cfg = ArenaConfig::default().with_port(4100);
        assert_eq!(cfg.server_addr, "127.0.0.1:4100");
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = ArenaConfig::from_file("/nonexistent/arena.json").unwrap_err();
        assert!(err.to_string().contains("read config"));
    }
}
