//! Client-side replica of the other players.
//!
//! The roster is driven purely by server events. Health is tracked here and
//! nowhere else, so two clients can disagree about a player's health.

use std::collections::BTreeMap;

use arena_shared::{
    combat::Health,
    math::Vec3,
    net::{CombatEvent, PlayerId, ServerEvent},
};
use rand::Rng;
use tracing::{debug, info};

/// A remote player as this client sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub position: Vec3,
    /// Display colour as `0xRRGGBB`.
    pub color: u32,
    pub health: Health,
}

/// Known players keyed by id, plus the local player's own health.
#[derive(Debug)]
pub struct Roster {
    local_id: PlayerId,
    local_health: Health,
    players: BTreeMap<PlayerId, RemotePlayer>,
}

impl Roster {
    pub fn new(local_id: PlayerId) -> Self {
        Self {
            local_id,
            local_health: Health::default(),
            players: BTreeMap::new(),
        }
    }

    pub fn local_id(&self) -> PlayerId {
        self.local_id
    }

    pub fn local_health(&self) -> Health {
        self.local_health
    }

    pub fn get(&self, id: PlayerId) -> Option<&RemotePlayer> {
        self.players.get(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    /// True if `id` is the local player or a known remote player.
    pub fn knows(&self, id: PlayerId) -> bool {
        id == self.local_id || self.players.contains_key(&id)
    }

    /// Applies one server event.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::PlayerConnected(p) if p.player_id != self.local_id => {
                info!(player_id = %p.player_id, "Player connected");
                let color = rand::thread_rng().gen_range(0..=0xFF_FFFF);
                self.players.insert(
                    p.player_id,
                    RemotePlayer {
                        position: p.position,
                        color,
                        health: Health::default(),
                    },
                );
            }
            ServerEvent::PlayerDisconnected(id) => {
                if self.players.remove(id).is_some() {
                    info!(player_id = %id, "Player disconnected");
                }
            }
            ServerEvent::Move(m) if m.player_id != self.local_id => {
                if let Some(p) = self.players.get_mut(&m.player_id) {
                    p.position = m.position;
                }
            }
            ServerEvent::Combat(c) => {
                self.apply_combat(c);
            }
            other => {
                debug!(event = other.name(), "Roster ignores event");
            }
        }
    }

    fn apply_combat(&mut self, c: &CombatEvent) {
        if !self.knows(c.attacker_id) || !self.knows(c.target_id) {
            return;
        }
        let Some(damage) = c.damage else {
            return;
        };
        let health = if c.target_id == self.local_id {
            &mut self.local_health
        } else {
            match self.players.get_mut(&c.target_id) {
                Some(p) => &mut p.health,
                None => return,
            }
        };
        health.take_damage(damage);
        if health.is_defeated() {
            info!(player_id = %c.target_id, "Player defeated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::net::{PlayerMoved, PlayerSnapshot};

    fn connected(id: u64, pos: Vec3) -> ServerEvent {
        ServerEvent::PlayerConnected(PlayerSnapshot {
            player_id: PlayerId(id),
            position: pos,
        })
    }

    fn hit(attacker: u64, target: u64, damage: Option<u32>) -> ServerEvent {
        ServerEvent::Combat(CombatEvent {
            attacker_id: PlayerId(attacker),
            target_id: PlayerId(target),
            ability_name: "basicAttack".into(),
            damage,
        })
    }

    #[test]
    fn tracks_joins_moves_and_leaves() {
        let mut r = Roster::new(PlayerId(0));
        r.apply(&connected(1, Vec3::ZERO));
        r.apply(&connected(2, Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(r.ids(), vec![PlayerId(1), PlayerId(2)]);

        r.apply(&ServerEvent::Move(PlayerMoved {
            player_id: PlayerId(1),
            position: Vec3::new(0.0, 0.0, 5.0),
        }));
        assert_eq!(r.get(PlayerId(1)).unwrap().position, Vec3::new(0.0, 0.0, 5.0));

        r.apply(&ServerEvent::PlayerDisconnected(PlayerId(2)));
        assert_eq!(r.ids(), vec![PlayerId(1)]);
    }

    #[test]
    fn ignores_events_about_self_and_strangers() {
        let mut r = Roster::new(PlayerId(0));
        r.apply(&connected(0, Vec3::ZERO));
        r.apply(&ServerEvent::Move(PlayerMoved {
            player_id: PlayerId(9),
            position: Vec3::new(1.0, 1.0, 1.0),
        }));
        assert!(r.is_empty());
    }

    #[test]
    fn colours_fit_in_rgb() {
        let mut r = Roster::new(PlayerId(0));
        for id in 1..20 {
            r.apply(&connected(id, Vec3::ZERO));
        }
        assert!(r.players.values().all(|p| p.color <= 0xFF_FFFF));
    }

    #[test]
    fn combat_damages_known_target() {
        let mut r = Roster::new(PlayerId(0));
        r.apply(&connected(1, Vec3::ZERO));

        r.apply(&hit(0, 1, Some(20)));
        assert_eq!(r.get(PlayerId(1)).unwrap().health.current(), 80);

        r.apply(&hit(1, 0, Some(50)));
        r.apply(&hit(1, 0, Some(50)));
        assert!(r.local_health().is_defeated());
    }

    #[test]
    fn combat_needs_both_sides_and_damage() {
        let mut r = Roster::new(PlayerId(0));
        r.apply(&connected(1, Vec3::ZERO));

        r.apply(&hit(7, 1, Some(20)));
        r.apply(&hit(0, 1, None));
        assert_eq!(r.get(PlayerId(1)).unwrap().health.current(), 100);
    }
}
