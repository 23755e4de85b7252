//! Abilities and the client-side health model.
//!
//! The relay only looks up catalog damage so every client applies the same
//! amount per hit. Health itself lives on each client's local copy of a
//! player and is never synchronized, so clients can disagree about it.

use std::{collections::HashMap, time::Duration};

/// Health every player starts with.
pub const MAX_HEALTH: i32 = 100;

/// Static description of one ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ability {
    pub name: &'static str,
    pub damage: u32,
    pub cooldown: Duration,
}

/// Every ability a player can use.
pub const ABILITIES: &[Ability] = &[
    Ability {
        name: "basicAttack",
        damage: 20,
        cooldown: Duration::from_millis(1000),
    },
    Ability {
        name: "specialAbility",
        damage: 50,
        cooldown: Duration::from_millis(5000),
    },
];

/// Looks up an ability by its wire name.
pub fn ability(name: &str) -> Option<&'static Ability> {
    ABILITIES.iter().find(|a| a.name == name)
}

/// Range check between two players. Always succeeds for now.
pub fn in_combat_range(_attacker: crate::math::Vec3, _target: crate::math::Vec3) -> bool {
    true
}

/// Local health of one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    current: i32,
    defeated: bool,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            current: MAX_HEALTH,
            defeated: false,
        }
    }
}

impl Health {
    pub fn current(&self) -> i32 {
        self.current
    }

    /// Applies damage; once health reaches zero the player stays defeated.
    pub fn take_damage(&mut self, damage: u32) {
        let damage = i32::try_from(damage).unwrap_or(i32::MAX);
        self.current = self.current.saturating_sub(damage);
        if self.current <= 0 {
            self.defeated = true;
        }
    }

    pub fn is_defeated(&self) -> bool {
        self.defeated
    }
}

/// Per-ability cooldown tracking, keyed by ability name.
///
/// Time is passed in explicitly so callers can drive it from a clock of their
/// choosing (`tokio::time::Instant` in the client, plain offsets in tests).
#[derive(Debug, Default)]
pub struct Cooldowns<T> {
    ready_at: HashMap<&'static str, T>,
}

impl<T> Cooldowns<T>
where
    T: Copy + PartialOrd + std::ops::Add<Duration, Output = T>,
{
    pub fn new() -> Self {
        Self {
            ready_at: HashMap::new(),
        }
    }

    pub fn is_on_cooldown(&self, ability: &Ability, now: T) -> bool {
        self.ready_at
            .get(ability.name)
            .is_some_and(|ready| *ready > now)
    }

    /// Starts the cooldown if the ability is ready. Returns whether it was.
    pub fn try_use(&mut self, ability: &'static Ability, now: T) -> bool {
        if self.is_on_cooldown(ability, now) {
            return false;
        }
        self.ready_at.insert(ability.name, now + ability.cooldown);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup() {
        assert_eq!(ability("basicAttack").map(|a| a.damage), Some(20));
        assert_eq!(ability("specialAbility").map(|a| a.damage), Some(50));
        assert!(ability("fireball").is_none());
    }

    #[test]
    fn health_defeats_at_zero() {
        let mut h = Health::default();
        h.take_damage(50);
        assert!(!h.is_defeated());
        h.take_damage(50);
        assert_eq!(h.current(), 0);
        assert!(h.is_defeated());
    }

    #[test]
    fn huge_damage_does_not_overflow() {
        let mut h = Health::default();
        h.take_damage(u32::MAX);
        assert!(h.is_defeated());
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let basic = ability("basicAttack").unwrap();
        let mut cds: Cooldowns<Duration> = Cooldowns::new();
        let t0 = Duration::from_secs(10);

        assert!(cds.try_use(basic, t0));
        assert!(!cds.try_use(basic, t0 + Duration::from_millis(999)));
        assert!(cds.try_use(basic, t0 + Duration::from_millis(1000)));
    }

    #[test]
    fn cooldowns_are_per_ability() {
        let basic = ability("basicAttack").unwrap();
        let special = ability("specialAbility").unwrap();
        let mut cds: Cooldowns<Duration> = Cooldowns::new();
        let t0 = Duration::ZERO;

        assert!(cds.try_use(special, t0));
        assert!(cds.try_use(basic, t0));
        assert!(cds.is_on_cooldown(special, t0 + Duration::from_secs(4)));
    }
}
