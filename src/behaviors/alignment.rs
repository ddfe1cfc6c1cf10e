use bevy::math::Vec3;

use super::planar;
use crate::agent::FlockAgent;

/// Head the same way as the neighbors. The agent's own facing is part of
/// the average, so a lone agent keeps going straight. Neighbors that
/// cancel out exactly produce zero rather than NaN.
pub fn steer(agent: &FlockAgent, neighbors: &[&FlockAgent]) -> Vec3 {
    if neighbors.is_empty() {
        return agent.forward;
    }

    let heading = neighbors
        .iter()
        .fold(agent.forward, |acc, neighbor| acc + neighbor.forward);
    planar(heading / (neighbors.len() + 1) as f32)
}
