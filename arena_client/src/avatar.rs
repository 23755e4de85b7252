//! Local player movement.
//!
//! Movement is relative to the avatar's yaw. At yaw 0 the avatar faces -Z,
//! matching the renderer's camera convention; positive `rotate` turns right.

use arena_shared::math::Vec3;

/// One movement step, as produced by a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Forward,
    Backward,
    Left,
    Right,
}

impl Step {
    /// Maps arrow-key names to steps.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ArrowUp" => Some(Step::Forward),
            "ArrowDown" => Some(Step::Backward),
            "ArrowLeft" => Some(Step::Left),
            "ArrowRight" => Some(Step::Right),
            _ => None,
        }
    }
}

/// The locally controlled player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Avatar {
    pub position: Vec3,
    /// Rotation about +Y in radians.
    pub yaw: f32,
    /// Distance per step.
    pub speed: f32,
}

impl Avatar {
    pub fn new(speed: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            yaw: 0.0,
            speed,
        }
    }

    /// Unit vector the avatar is facing.
    pub fn direction(&self) -> Vec3 {
        Vec3::new(-self.yaw.sin(), 0.0, -self.yaw.cos())
    }

    pub fn rotate(&mut self, angle: f32) {
        self.yaw -= angle;
    }

    pub fn move_forward(&mut self, distance: f32) {
        self.position = self.position + self.direction().scale(distance);
    }

    pub fn move_backward(&mut self, distance: f32) {
        self.position = self.position + (-self.direction()).scale(distance);
    }

    pub fn move_left(&mut self, distance: f32) {
        let d = self.direction();
        let left = Vec3::new(d.z, 0.0, -d.x).normalized();
        self.position = self.position + left.scale(distance);
    }

    pub fn move_right(&mut self, distance: f32) {
        let d = self.direction();
        let right = Vec3::new(-d.z, 0.0, d.x).normalized();
        self.position = self.position + right.scale(distance);
    }

    /// Applies one step at the configured speed and returns the new position.
    pub fn apply(&mut self, step: Step) -> Vec3 {
        match step {
            Step::Forward => self.move_forward(self.speed),
            Step::Backward => self.move_backward(self.speed),
            Step::Left => self.move_left(self.speed),
            Step::Right => self.move_right(self.speed),
        }
        self.position
    }
}
