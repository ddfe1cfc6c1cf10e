use bevy::math::Vec3;
use derivative::Derivative;
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

use super::planar;
use crate::{
    agent::FlockAgent,
    obstacles::{AvoidanceDirections, ObstacleProbe},
};

/// Probe settings for obstacle avoidance. This is not a replacement for
/// navigation; an agent can still get stuck in a dead end.
#[derive(Debug, Copy, Clone, PartialEq, Derivative)]
#[derivative(Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct AvoidanceSettings {
    /// Radius of the sphere swept ahead of the agent.
    #[derivative(Default(value = "0.7"))]
    pub probe_radius: f32,
    /// How far ahead to look for obstacles.
    #[derivative(Default(value = "6.0"))]
    pub max_distance: f32,
}

impl AvoidanceSettings {
    /// Set the radius of the probe sphere. Roughly the agent's own radius.
    pub fn with_probe_radius(mut self, radius: f32) -> Self {
        self.probe_radius = radius;
        self
    }

    /// Set how far ahead obstacles are looked for.
    pub fn with_max_distance(mut self, distance: f32) -> Self {
        self.max_distance = distance;
        self
    }
}

/// Keep going forward while the way ahead is clear. Once it is blocked,
/// take the first escape direction, in generation order, whose probe is
/// clear. When every direction is blocked, keep going forward anyway.
pub fn steer<P: ObstacleProbe + ?Sized>(
    agent: &FlockAgent,
    probe: &P,
    directions: &AvoidanceDirections,
    settings: &AvoidanceSettings,
) -> Vec3 {
    let clear = |direction: Vec3| {
        !probe.is_blocked(
            agent.position,
            settings.probe_radius,
            direction,
            settings.max_distance,
        )
    };

    if clear(agent.forward) {
        return agent.forward;
    }

    directions
        .world(agent.forward)
        .find(|direction| clear(*direction))
        .map(planar)
        .unwrap_or(agent.forward)
}
