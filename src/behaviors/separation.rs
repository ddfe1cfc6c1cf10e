use bevy::math::Vec3;

use super::planar;
use crate::agent::FlockAgent;

/// Move away from neighbors strictly closer than `avoidance_radius`.
/// Neighbors further out, even within the neighborhood, are ignored.
pub fn steer(agent: &FlockAgent, neighbors: &[&FlockAgent], avoidance_radius: f32) -> Vec3 {
    let radius_sq = avoidance_radius * avoidance_radius;
    let (away, count) = neighbors
        .iter()
        .map(|neighbor| agent.position - neighbor.position)
        .filter(|offset| offset.length_squared() < radius_sq)
        .fold((Vec3::ZERO, 0usize), |(sum, n), offset| (sum + offset, n + 1));

    if count == 0 {
        return Vec3::ZERO;
    }
    planar(away / count as f32)
}
