//! Shared helpers for the socket-level tests.
//!
//! `RawPeer` speaks the wire protocol directly so tests can send frames the
//! real client never would (bad handshakes, malformed payloads, spoofed
//! fields).

use std::time::Duration;

use anyhow::Context;
use arena_server::{server::bind_ephemeral_with, RelayHandle};
use arena_shared::{
    config::ArenaConfig,
    net::{
        decode_server_event, ClientEvent, FrameWriter, FramedConn, Hello, PlayerId, ServerEvent,
        DEFAULT_MAX_FRAME_LEN, PROTOCOL_VERSION,
    },
};
use serde::Serialize;
use tokio::{net::tcp::OwnedWriteHalf, sync::mpsc, task::JoinHandle};

/// How long a test waits before deciding nothing else is coming.
pub const QUIET: Duration = Duration::from_millis(200);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Starts a relay on an ephemeral port with default settings.
pub async fn start_relay() -> anyhow::Result<(RelayHandle, ArenaConfig)> {
    start_relay_with(ArenaConfig::default()).await
}

pub async fn start_relay_with(cfg: ArenaConfig) -> anyhow::Result<(RelayHandle, ArenaConfig)> {
    init_tracing();
    let (server, cfg) = bind_ephemeral_with(cfg).await?;
    Ok((server.spawn()?, cfg))
}

/// A connection that writes arbitrary frames and collects server events.
pub struct RawPeer {
    writer: FrameWriter<OwnedWriteHalf>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    reader: JoinHandle<()>,
}

impl RawPeer {
    /// Opens a TCP connection without sending anything.
    pub async fn connect(cfg: &ArenaConfig) -> anyhow::Result<Self> {
        let addr = cfg.server_addr.parse().context("parse server_addr")?;
        let conn = FramedConn::connect(addr, DEFAULT_MAX_FRAME_LEN).await?;
        let (mut reader, writer) = conn.into_split();
        let (tx, events) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            while let Ok(Some(frame)) = reader.read_frame().await {
                let Ok(event) = decode_server_event(&frame) else {
                    break;
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
        Ok(Self {
            writer,
            events,
            reader,
        })
    }

    /// Connects and completes the handshake, returning the assigned id.
    pub async fn join(cfg: &ArenaConfig) -> anyhow::Result<(Self, PlayerId)> {
        let mut peer = Self::connect(cfg).await?;
        peer.send(&ClientEvent::Hello(Hello {
            protocol: PROTOCOL_VERSION,
        }))
        .await?;
        match peer.recv().await {
            Some(ServerEvent::PlayerId(id)) => Ok((peer, id)),
            other => anyhow::bail!("expected player-id, got {other:?}"),
        }
    }

    /// Sends any serializable value as one frame.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    /// Next event, or `None` after `QUIET` or once the connection closed.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        tokio::time::timeout(QUIET, self.events.recv())
            .await
            .ok()
            .flatten()
    }

    /// Everything that arrives before a quiet gap.
    pub async fn drain(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Some(ev) = self.recv().await {
            out.push(ev);
        }
        out
    }

    /// True once the relay has closed this connection.
    pub async fn is_closed(&mut self) -> bool {
        tokio::time::timeout(QUIET, async {
            while self.events.recv().await.is_some() {}
        })
        .await
        .is_ok()
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.writer.shutdown().await
    }
}

impl Drop for RawPeer {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
