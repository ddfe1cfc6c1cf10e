use std::fmt;

use bevy::{math::Vec3, reflect::Reflect};
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

use crate::SMALL_THRESHOLD;

/// Identifies an agent within its flock. Ids are never reused by a flock,
/// so a stale id simply stops matching once its agent is gone.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct AgentId(pub(crate) u64);

impl AgentId {
    /// The raw value of this id.
    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Agent_{}", self.0)
    }
}

/// A single member of a flock. Agents carry no behavior of their own;
/// they store the result of the flock controller's decision each tick.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct FlockAgent {
    pub(crate) id: AgentId,
    pub(crate) position: Vec3,
    /// Always unit length with a zero vertical component.
    pub(crate) forward: Vec3,
}

impl FlockAgent {
    pub(crate) fn new(id: AgentId, position: Vec3, forward: Vec3) -> Self {
        let forward = planar_or(forward, Vec3::Z);
        Self {
            id,
            position,
            forward,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// The direction the agent is facing, on the horizontal plane.
    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    /// Face along `velocity` and integrate it over `dt`. A zero velocity
    /// keeps the current facing.
    pub fn move_by(&mut self, velocity: Vec3, dt: f32) {
        self.forward = planar_or(velocity, self.forward);
        self.position += velocity * dt;
    }

    pub(crate) fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }
}

/// Flatten `v` onto the horizontal plane and normalize it, falling back
/// to `fallback` when nothing is left.
fn planar_or(v: Vec3, fallback: Vec3) -> Vec3 {
    let flat = Vec3::new(v.x, 0.0, v.z);
    if flat.length_squared() > SMALL_THRESHOLD {
        flat.normalize()
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_by_faces_velocity() {
        let mut agent = FlockAgent::new(AgentId(0), Vec3::ZERO, Vec3::Z);
        agent.move_by(Vec3::new(2.0, 0.0, 0.0), 0.5);
        assert!(agent.forward().abs_diff_eq(Vec3::X, 0.0001));
        assert!(agent.position().abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 0.0001));
    }

    #[test]
    fn test_zero_velocity_keeps_facing() {
        let mut agent = FlockAgent::new(AgentId(3), Vec3::ONE, Vec3::NEG_X);
        agent.move_by(Vec3::ZERO, 1.0);
        assert_eq!(agent.forward(), Vec3::NEG_X);
        assert_eq!(agent.position(), Vec3::ONE);
    }

    #[test]
    fn test_forward_is_kept_planar() {
        let agent = FlockAgent::new(AgentId(1), Vec3::ZERO, Vec3::new(0.0, 3.0, 4.0));
        assert_eq!(agent.forward().y, 0.0);
        assert!((agent.forward().length() - 1.0).abs() < 0.0001);
        assert_eq!(agent.id().to_string(), "Agent_1");
    }
}
