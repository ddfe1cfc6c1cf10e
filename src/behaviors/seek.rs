use bevy::math::Vec3;

use super::planar;
use crate::agent::FlockAgent;

/// Seek moves the agent towards the target, and stops pulling once the
/// agent is within `threshold` so the flock doesn't jitter on arrival.
pub fn steer(agent: &FlockAgent, target: Vec3, threshold: f32) -> Vec3 {
    let to_target = target - agent.position;
    if to_target.length() > threshold {
        planar(to_target)
    } else {
        Vec3::ZERO
    }
}
