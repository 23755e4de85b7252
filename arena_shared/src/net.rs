//! Networking primitives.
//!
//! Goals:
//! - Provide the closed set of events exchanged between client and relay.
//! - Provide a length-prefixed frame codec over any async byte stream.
//! - Keep serialization explicit and versionable.
//!
//! Every frame is a 4-byte big-endian length followed by a JSON envelope of
//! the form `{"event": "<name>", "data": <payload>}`.

use std::{fmt, net::SocketAddr};

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};
use tracing::{debug, warn};

use crate::math::Vec3;

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default upper bound on a single frame payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Identifies a connected player for the lifetime of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client -> server events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Transport handshake; must be the first frame on a connection.
    Hello(Hello),
    /// The sender's new position.
    Move(MoveRequest),
    /// The sender uses an ability on another player.
    Combat(CombatRequest),
}

/// Server -> client events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Handshake refused; the connection is closed afterwards.
    Rejected(Rejected),
    /// The id assigned to the receiving connection.
    PlayerId(PlayerId),
    /// Another player is present (either already connected or just joined).
    PlayerConnected(PlayerSnapshot),
    /// Another player left.
    PlayerDisconnected(PlayerId),
    /// Another player moved.
    Move(PlayerMoved),
    /// A combat action between two connected players.
    Combat(CombatEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hello {
    pub protocol: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rejected {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveRequest {
    pub position: Vec3,
}

/// Combat request. The attacker is always the sending connection; an
/// `attackerId` field in the payload is accepted and ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CombatRequest {
    pub target_id: PlayerId,
    pub ability_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub player_id: PlayerId,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMoved {
    pub player_id: PlayerId,
    pub position: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CombatEvent {
    pub attacker_id: PlayerId,
    pub target_id: PlayerId,
    pub ability_name: String,
    /// Catalog damage for `ability_name`; absent for unknown abilities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<u32>,
}

impl ClientEvent {
    /// Short event name, as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Hello(_) => "hello",
            ClientEvent::Move(_) => "move",
            ClientEvent::Combat(_) => "combat",
        }
    }
}

impl ServerEvent {
    /// Short event name, as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Rejected(_) => "rejected",
            ServerEvent::PlayerId(_) => "player-id",
            ServerEvent::PlayerConnected(_) => "player-connected",
            ServerEvent::PlayerDisconnected(_) => "player-disconnected",
            ServerEvent::Move(_) => "move",
            ServerEvent::Combat(_) => "combat",
        }
    }
}

/// Encodes any event into a length-prefixed frame.
pub fn encode_frame<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    let len = u32::try_from(payload.len()).context("frame too large")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(len);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Decodes and validates a client event payload (without the length prefix).
pub fn decode_client_event(b: &[u8]) -> anyhow::Result<ClientEvent> {
    let event: ClientEvent = serde_json::from_slice(b).context("deserialize client event")?;
    if let ClientEvent::Move(MoveRequest { position }) = &event {
        anyhow::ensure!(position.is_finite(), "non-finite position {position:?}");
    }
    Ok(event)
}

/// Decodes a server event payload (without the length prefix).
pub fn decode_server_event(b: &[u8]) -> anyhow::Result<ServerEvent> {
    serde_json::from_slice(b).context("deserialize server event")
}

/// Reading half of a framed connection.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_len: usize) -> Self {
        Self {
            inner,
            max_frame_len,
        }
    }

    /// Reads one frame payload. Returns `None` on a clean EOF at a frame
    /// boundary.
    pub async fn read_frame(&mut self) -> anyhow::Result<Option<Bytes>> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).context("read frame len"),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame_len {
            warn!(len, limit = self.max_frame_len, "Rejecting oversized frame");
            anyhow::bail!(
                "frame of {len} bytes exceeds limit of {}",
                self.max_frame_len
            );
        }
        let mut payload = BytesMut::zeroed(len);
        self.inner
            .read_exact(&mut payload)
            .await
            .context("read frame payload")?;
        Ok(Some(payload.freeze()))
    }

    /// Reads and deserializes one frame; EOF is an error here.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let payload = self
            .read_frame()
            .await?
            .context("connection closed")?;
        serde_json::from_slice(&payload).context("deserialize msg")
    }
}

/// Writing half of a framed connection.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let frame = encode_frame(msg)?;
        self.inner.write_all(&frame).await.context("tcp write")?;
        Ok(())
    }

    /// Flushes and closes the write side.
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.context("tcp shutdown")
    }
}

/// Framed TCP connection used by both ends before it is split.
#[derive(Debug)]
pub struct FramedConn {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    peer: SocketAddr,
}

impl FramedConn {
    pub fn new(stream: TcpStream, max_frame_len: usize) -> anyhow::Result<Self> {
        let peer = stream.peer_addr().context("peer addr")?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read, max_frame_len),
            writer: FrameWriter::new(write),
            peer,
        })
    }

    pub async fn connect(addr: SocketAddr, max_frame_len: usize) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Self::new(stream, max_frame_len)
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        self.reader.recv().await
    }

    pub async fn read_frame(&mut self) -> anyhow::Result<Option<Bytes>> {
        self.reader.read_frame().await
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

/// TCP server listener.
pub struct FramedListener {
    listener: TcpListener,
    max_frame_len: usize,
}

impl FramedListener {
    pub async fn bind(addr: SocketAddr, max_frame_len: usize) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        debug!(%addr, max_frame_len, "Framed listener bound");
        Ok(Self {
            listener,
            max_frame_len,
        })
    }

    pub async fn accept(&self) -> anyhow::Result<FramedConn> {
        let (stream, _addr) = self.listener.accept().await.context("tcp accept")?;
        FramedConn::new(stream, self.max_frame_len)
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
