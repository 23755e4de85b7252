//! Session relay.
//!
//! `Relay` owns the session registry and the id counter. It is a plain
//! synchronous state machine: the coordinator task in `server.rs` is its only
//! owner, so every operation runs to completion before the next one starts
//! and no locking is needed.
//!
//! Fan-out never awaits. Each session has a bounded outbox and events are
//! pushed with `try_send`; a session whose outbox is full or closed is a
//! laggard and gets evicted once the current fan-out is done. Eviction
//! announces the departure to the remaining sessions, which may in turn find
//! more laggards, so it runs as a worklist until the registry is clean.

use std::collections::{BTreeMap, BTreeSet};

use arena_shared::{
    combat::{ability, in_combat_range},
    math::Vec3,
    net::{
        ClientEvent, CombatEvent, CombatRequest, PlayerId, PlayerMoved, PlayerSnapshot,
        ServerEvent,
    },
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Sending side of a session's bounded event queue.
pub type Outbox = mpsc::Sender<ServerEvent>;

/// One connected player.
#[derive(Debug)]
struct Session {
    outbox: Outbox,
    position: Vec3,
}

/// Registry of connected sessions plus the fan-out rules between them.
#[derive(Debug, Default)]
pub struct Relay {
    sessions: BTreeMap<PlayerId, Session>,
    next_id: u64,
    laggards: BTreeSet<PlayerId>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Id the next connection will receive.
    pub fn next_id(&self) -> PlayerId {
        PlayerId(self.next_id)
    }

    pub fn position(&self, id: PlayerId) -> Option<Vec3> {
        self.sessions.get(&id).map(|s| s.position)
    }

    /// Every registered session in ascending id order.
    pub fn players(&self) -> Vec<PlayerSnapshot> {
        self.sessions
            .iter()
            .map(|(id, s)| PlayerSnapshot {
                player_id: *id,
                position: s.position,
            })
            .collect()
    }

    /// Registers a new session and introduces it to everyone else.
    ///
    /// The new session receives its own id, then one `player-connected` per
    /// existing session; every existing session receives one
    /// `player-connected` for the newcomer.
    pub fn connect(&mut self, outbox: Outbox) -> PlayerId {
        let id = PlayerId(self.next_id);
        self.next_id += 1;

        let peers: Vec<PlayerSnapshot> = self.players();
        self.sessions.insert(
            id,
            Session {
                outbox,
                position: Vec3::ZERO,
            },
        );

        self.send_to(id, ServerEvent::PlayerId(id));
        for peer in peers {
            self.send_to(id, ServerEvent::PlayerConnected(peer));
        }
        self.broadcast(
            ServerEvent::PlayerConnected(PlayerSnapshot {
                player_id: id,
                position: Vec3::ZERO,
            }),
            Some(id),
        );

        info!(player_id = %id, sessions = self.sessions.len(), "Session registered");
        self.evict_laggards();
        id
    }

    /// Creates the outbox for a new session and registers it.
    ///
    /// The outbox holds at least `capacity` events and always has room for
    /// the join backlog (`player-id` plus one `player-connected` per existing
    /// session), so a newcomer is never evicted before its writer has run.
    pub fn open_session(&mut self, capacity: usize) -> (PlayerId, mpsc::Receiver<ServerEvent>) {
        let (outbox, rx) = mpsc::channel(capacity.max(self.sessions.len() + 1));
        (self.connect(outbox), rx)
    }

    /// Dispatches one decoded client event from `id`.
    pub fn handle_event(&mut self, id: PlayerId, event: ClientEvent) {
        match event {
            ClientEvent::Move(req) => {
                self.move_player(id, req.position);
            }
            ClientEvent::Combat(req) => {
                self.combat(id, req);
            }
            ClientEvent::Hello(_) => {
                debug!(player_id = %id, "Ignoring hello from registered session");
            }
        }
    }

    /// Stores a new position and relays it to everyone but the sender.
    /// Returns false if `id` is not registered.
    pub fn move_player(&mut self, id: PlayerId, position: Vec3) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            debug!(player_id = %id, "Move from unknown session");
            return false;
        };
        session.position = position;

        self.broadcast(
            ServerEvent::Move(PlayerMoved {
                player_id: id,
                position,
            }),
            Some(id),
        );
        self.evict_laggards();
        true
    }

    /// Relays a combat action to every session, the attacker included.
    ///
    /// Nothing is sent when either side is not registered. No health is kept
    /// here; the event carries catalog damage and each client applies it to
    /// its own copy of the target.
    pub fn combat(&mut self, attacker: PlayerId, req: CombatRequest) -> Option<CombatEvent> {
        let (Some(a), Some(t)) = (
            self.sessions.get(&attacker),
            self.sessions.get(&req.target_id),
        ) else {
            debug!(attacker = %attacker, target = %req.target_id, "Combat with unknown session");
            return None;
        };
        if !in_combat_range(a.position, t.position) {
            return None;
        }

        let event = CombatEvent {
            attacker_id: attacker,
            target_id: req.target_id,
            damage: ability(&req.ability_name).map(|a| a.damage),
            ability_name: req.ability_name,
        };
        debug!(
            attacker = %attacker,
            target = %event.target_id,
            ability = %event.ability_name,
            "Combat"
        );
        self.broadcast(ServerEvent::Combat(event.clone()), None);
        self.evict_laggards();
        Some(event)
    }

    /// Removes a session and tells the remaining sessions it left.
    /// Returns false if `id` was not registered.
    pub fn disconnect(&mut self, id: PlayerId) -> bool {
        if self.sessions.remove(&id).is_none() {
            return false;
        }
        info!(player_id = %id, sessions = self.sessions.len(), "Session removed");
        self.broadcast(ServerEvent::PlayerDisconnected(id), None);
        self.evict_laggards();
        true
    }

    /// Operator removal; observably the same as a disconnect.
    pub fn kick(&mut self, id: PlayerId) -> bool {
        let kicked = self.disconnect(id);
        if kicked {
            warn!(player_id = %id, "Session kicked");
        }
        kicked
    }

    fn send_to(&mut self, id: PlayerId, event: ServerEvent) {
        if let Some(session) = self.sessions.get(&id) {
            if let Err(e) = session.outbox.try_send(event) {
                self.mark_laggard(id, &e);
            }
        }
    }

    fn broadcast(&mut self, event: ServerEvent, except: Option<PlayerId>) {
        let mut failed = Vec::new();
        for (id, session) in &self.sessions {
            if Some(*id) == except {
                continue;
            }
            if let Err(e) = session.outbox.try_send(event.clone()) {
                failed.push((*id, e));
            }
        }
        for (id, e) in failed {
            self.mark_laggard(id, &e);
        }
    }

    fn mark_laggard(&mut self, id: PlayerId, err: &TrySendError<ServerEvent>) {
        match err {
            TrySendError::Full(ev) => {
                warn!(player_id = %id, dropped = ev.name(), "Outbox full, evicting slow consumer");
            }
            TrySendError::Closed(_) => {
                debug!(player_id = %id, "Outbox closed");
            }
        }
        self.laggards.insert(id);
    }

    fn evict_laggards(&mut self) {
        while let Some(id) = self.laggards.pop_first() {
            if self.sessions.remove(&id).is_some() {
                info!(player_id = %id, sessions = self.sessions.len(), "Session evicted");
                self.broadcast(ServerEvent::PlayerDisconnected(id), None);
            }
        }
    }
}
