//! Client implementation.
//!
//! The client maintains:
//! - A framed TCP connection to the relay (handshake, then events both ways)
//! - A background reader that decodes server events into a channel
//! - The local avatar and a roster of the other players
//! - Local ability cooldowns

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use arena_shared::{
    combat::{ability, in_combat_range, Cooldowns},
    config::ArenaConfig,
    math::Vec3,
    net::{
        decode_server_event, ClientEvent, CombatRequest, FrameReader, FrameWriter, FramedConn,
        Hello, MoveRequest, PlayerId, ServerEvent, PROTOCOL_VERSION,
    },
};
use tokio::{
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::mpsc,
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    avatar::{Avatar, Step},
    roster::Roster,
};

/// Events buffered between the reader task and the client.
const EVENT_BUFFER: usize = 256;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Handshake in progress.
    Connecting,
    /// Registered with the relay.
    Connected,
    /// Connection closed; a new connection gets a new id.
    Disconnected,
}

/// High-level arena client.
pub struct ArenaClient {
    pub player_id: PlayerId,
    pub state: ClientState,
    pub avatar: Avatar,
    pub roster: Roster,

    writer: FrameWriter<OwnedWriteHalf>,
    events: mpsc::Receiver<ServerEvent>,
    reader: JoinHandle<()>,
    cooldowns: Cooldowns<Instant>,
    server: SocketAddr,
}

impl ArenaClient {
    /// Connects to the relay and performs the `hello` handshake.
    pub async fn connect(cfg: &ArenaConfig) -> anyhow::Result<Self> {
        let server: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(%server, "Connecting to relay");

        let mut conn = FramedConn::connect(server, cfg.max_frame_len).await?;
        let mut state = ClientState::Connecting;
        debug!(?state, "Sending hello");
        conn.send(&ClientEvent::Hello(Hello {
            protocol: PROTOCOL_VERSION,
        }))
        .await?;

        let first: ServerEvent = tokio::time::timeout(cfg.handshake_timeout(), conn.recv())
            .await
            .context("handshake timed out")??;
        let player_id = match first {
            ServerEvent::PlayerId(id) => id,
            ServerEvent::Rejected(r) => anyhow::bail!("rejected by relay: {}", r.reason),
            other => anyhow::bail!("expected player-id, got {}", other.name()),
        };
        state = ClientState::Connected;
        info!(player_id = %player_id, ?state, "Connected to relay");

        let (reader, writer) = conn.into_split();
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(pump_events(reader, tx));

        Ok(Self {
            player_id,
            state,
            avatar: Avatar::new(cfg.player_speed),
            roster: Roster::new(player_id),
            writer,
            events,
            reader,
            cooldowns: Cooldowns::new(),
            server,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// Sends a position without touching the avatar.
    pub async fn send_position(&mut self, position: Vec3) -> anyhow::Result<()> {
        self.writer
            .send(&ClientEvent::Move(MoveRequest { position }))
            .await
    }

    /// Moves the avatar one step and reports the new position.
    pub async fn step(&mut self, step: Step) -> anyhow::Result<Vec3> {
        let position = self.avatar.apply(step);
        self.send_position(position).await?;
        Ok(position)
    }

    /// Turns the avatar; no event is sent since the relay only tracks position.
    pub fn turn(&mut self, angle: f32) {
        self.avatar.rotate(angle);
    }

    /// Uses an ability on `target`. Returns `false` without sending anything
    /// when the ability is unknown, the target is unknown or out of range,
    /// or the ability is cooling down.
    pub async fn attack(&mut self, target: PlayerId, ability_name: &str) -> anyhow::Result<bool> {
        let Some(ability) = ability(ability_name) else {
            warn!(ability = %ability_name, "Unknown ability");
            return Ok(false);
        };
        let Some(target_pos) = self.roster.get(target).map(|p| p.position) else {
            debug!(target = %target, "Attack on unknown player");
            return Ok(false);
        };
        if !in_combat_range(self.avatar.position, target_pos) {
            return Ok(false);
        }
        if !self.cooldowns.try_use(ability, Instant::now()) {
            debug!(ability = %ability_name, "Ability on cooldown");
            return Ok(false);
        }

        self.writer
            .send(&ClientEvent::Combat(CombatRequest {
                target_id: target,
                ability_name: ability_name.to_string(),
            }))
            .await?;
        Ok(true)
    }

    /// Waits for the next server event and applies it to the roster.
    /// Returns `None` once the connection is closed.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        match self.events.recv().await {
            Some(event) => {
                self.roster.apply(&event);
                Some(event)
            }
            None => {
                if self.state != ClientState::Disconnected {
                    info!(player_id = %self.player_id, "Disconnected from relay");
                }
                self.state = ClientState::Disconnected;
                None
            }
        }
    }

    /// Like `next_event`, giving up after `timeout`.
    pub async fn recv_event(&mut self, timeout: Duration) -> Option<ServerEvent> {
        tokio::time::timeout(timeout, self.next_event())
            .await
            .ok()
            .flatten()
    }

    /// Applies every event that arrives before a `quiet` gap.
    pub async fn drain_events(&mut self, quiet: Duration) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.recv_event(quiet).await {
            out.push(event);
        }
        out
    }

    /// Closes the connection; the relay announces the departure.
    pub async fn disconnect(mut self) -> anyhow::Result<()> {
        self.state = ClientState::Disconnected;
        self.writer.shutdown().await
    }

    /// Executes a console command.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            return Ok(Vec::new());
        };

        let step = match *first {
            "w" | "forward" => Some(Step::Forward),
            "s" | "back" => Some(Step::Backward),
            "a" | "left" => Some(Step::Left),
            "d" | "right" => Some(Step::Right),
            key => Step::from_key(key),
        };
        if let Some(step) = step {
            let count: u32 = tokens.get(1).and_then(|t| t.parse().ok()).unwrap_or(1);
            let mut position = self.avatar.position;
            for _ in 0..count {
                position = self.step(step).await?;
            }
            return Ok(vec![format!("Position: {position}")]);
        }

        match *first {
            "turn" => match tokens.get(1).and_then(|t| t.parse::<f32>().ok()) {
                Some(angle) => {
                    self.turn(angle);
                    Ok(vec![format!("Yaw: {:.2}", self.avatar.yaw)])
                }
                None => Ok(vec!["Usage: turn <radians>".to_string()]),
            },
            "attack" => {
                let Some(target) = tokens.get(1).and_then(|t| t.parse::<u64>().ok()) else {
                    return Ok(vec!["Usage: attack <id> [ability]".to_string()]);
                };
                let name = tokens.get(2).copied().unwrap_or("basicAttack");
                if self.attack(PlayerId(target), name).await? {
                    Ok(vec![format!("{name} -> {target}")])
                } else {
                    Ok(vec![format!("Cannot use {name} on {target} right now")])
                }
            }
            "status" => {
                let mut out = vec![
                    format!("State: {:?}", self.state),
                    format!("Player ID: {}", self.player_id),
                    format!("Position: {}", self.avatar.position),
                    format!("Health: {}", self.roster.local_health().current()),
                    format!("Players: {}", self.roster.len()),
                ];
                for id in self.roster.ids() {
                    if let Some(p) = self.roster.get(id) {
                        out.push(format!(
                            "  {id}: position={} health={} color=#{:06x}",
                            p.position,
                            p.health.current(),
                            p.color
                        ));
                    }
                }
                Ok(out)
            }
            other => Ok(vec![format!("Unknown command: {other}")]),
        }
    }
}

impl Drop for ArenaClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn pump_events(mut reader: FrameReader<OwnedReadHalf>, tx: mpsc::Sender<ServerEvent>) {
    loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => match decode_server_event(&frame) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Dropping malformed server frame"),
            },
            Ok(None) => {
                debug!("Relay closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Relay connection error");
                break;
            }
        }
    }
}
