use bevy::math::Vec3;
use enum_map::{Enum, EnumMap, enum_map};
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// The steering behaviors a flock composes each tick.
#[derive(Debug, Copy, Clone, Enum, EnumIter, Display, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum BehaviorType {
    Alignment,
    Separation,
    Cohesion,
    TargetSeek,
    ObstacleAvoidance,
}

/// How much each behavior contributes to the final heading. Weights are
/// kept in the range [0.0, 10.0]; a behavior with weight 0.0 is not
/// evaluated at all.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct BehaviorWeights(EnumMap<BehaviorType, f32>);

impl BehaviorWeights {
    pub const MAX: f32 = 10.0;

    /// Every behavior weighted equally at `weight`.
    pub fn uniform(weight: f32) -> Self {
        let weight = weight.clamp(0.0, Self::MAX);
        Self(enum_map! { _ => weight })
    }

    pub fn get(&self, behavior: BehaviorType) -> f32 {
        self.0[behavior]
    }

    pub fn set(&mut self, behavior: BehaviorType, weight: f32) {
        self.0[behavior] = weight.clamp(0.0, Self::MAX);
    }

    /// Set the weight of one behavior, clamped to [0.0, Self::MAX].
    pub fn with(mut self, behavior: BehaviorType, weight: f32) -> Self {
        self.set(behavior, weight);
        self
    }

    /// Behaviors with a non-zero weight, in declaration order.
    pub fn active(&self) -> impl Iterator<Item = (BehaviorType, f32)> + '_ {
        self.0
            .iter()
            .filter(|(_, weight)| **weight > 0.0)
            .map(|(behavior, weight)| (behavior, *weight))
    }

    pub(crate) fn out_of_range(&self) -> Option<(BehaviorType, f32)> {
        self.0
            .iter()
            .find(|(_, weight)| !(0.0..=Self::MAX).contains(*weight))
            .map(|(behavior, weight)| (behavior, *weight))
    }
}

impl Default for BehaviorWeights {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

/// The unweighted contribution of each behavior for one agent in one
/// tick. Every value is a planar unit vector or zero.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct SteeringOutputs {
    values: EnumMap<BehaviorType, Vec3>,
}

impl SteeringOutputs {
    pub fn get(&self, behavior: BehaviorType) -> Vec3 {
        self.values[behavior]
    }

    pub(crate) fn set(&mut self, behavior: BehaviorType, direction: Vec3) {
        self.values[behavior] = direction;
    }

    /// Weighted sum of all contributions.
    pub fn weighted_sum(&self, weights: &BehaviorWeights) -> Vec3 {
        self.values
            .iter()
            .map(|(behavior, direction)| *direction * weights.get(behavior))
            .fold(Vec3::ZERO, |acc, v| acc + v)
    }

    /// Combine the contributions into a velocity command of length
    /// `max_speed`. When the weighted sum cancels out exactly, the agent
    /// keeps going along `forward`.
    pub fn into_velocity(self, weights: &BehaviorWeights, forward: Vec3, max_speed: f32) -> Vec3 {
        let heading = self.weighted_sum(weights).normalize_or_zero();
        let heading = if heading == Vec3::ZERO {
            forward
        } else {
            heading
        };
        heading * max_speed
    }
}
