//! Steering behaviors. Each one is a pure function of the agent, its
//! neighbors and the flock settings, returning a direction on the
//! horizontal plane that is either unit length or zero.

pub mod alignment;
pub mod avoid;
pub mod cohesion;
pub mod seek;
pub mod separation;

use bevy::math::Vec3;
use rand::rngs::StdRng;

use crate::{
    agent::FlockAgent, control::BehaviorType, flock::FlockConfig, obstacles::AvoidanceDirections,
    obstacles::ObstacleProbe,
};

/// Everything a behavior may read while steering one agent.
pub struct SteeringContext<'a> {
    pub agent: &'a FlockAgent,
    pub neighbors: &'a [&'a FlockAgent],
    /// The whole flock as it was at the start of the tick.
    pub flock: &'a [FlockAgent],
    pub config: &'a FlockConfig,
    pub target: Vec3,
    pub directions: &'a AvoidanceDirections,
}

impl BehaviorType {
    /// Run this behavior for the agent in `ctx`.
    pub fn steer<P: ObstacleProbe + ?Sized>(
        self,
        ctx: &SteeringContext,
        probe: &P,
        rng: &mut StdRng,
    ) -> Vec3 {
        match self {
            BehaviorType::Alignment => alignment::steer(ctx.agent, ctx.neighbors),
            BehaviorType::Separation => separation::steer(
                ctx.agent,
                ctx.neighbors,
                ctx.config.avoidance_radius(),
            ),
            BehaviorType::Cohesion => cohesion::steer(ctx.agent, ctx.neighbors, ctx.flock, rng),
            BehaviorType::TargetSeek => {
                seek::steer(ctx.agent, ctx.target, ctx.config.target_threshold)
            }
            BehaviorType::ObstacleAvoidance => {
                avoid::steer(ctx.agent, probe, ctx.directions, &ctx.config.avoidance)
            }
        }
    }
}

/// Drop the vertical component and normalize, or zero.
pub(crate) fn planar(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z).normalize_or_zero()
}
