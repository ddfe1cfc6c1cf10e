use std::f32::consts::TAU;

use bevy::math::{Vec2, Vec3};
use derivative::Derivative;
use rand::{Rng, rngs::StdRng};
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Where the flock is heading. The flock updates the provider once per
/// tick, before any agent steers, and behaviors only ever read it.
pub trait TargetProvider {
    /// Advance the provider by `dt`. `origin` is the flock's origin.
    fn update(&mut self, _dt: f32, _origin: Vec3, _rng: &mut StdRng) {}

    fn position(&self) -> Vec3;
}

impl<T: TargetProvider + ?Sized> TargetProvider for Box<T> {
    fn update(&mut self, dt: f32, origin: Vec3, rng: &mut StdRng) {
        (**self).update(dt, origin, rng);
    }

    fn position(&self) -> Vec3 {
        (**self).position()
    }
}

/// A target that never moves.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct FixedTarget(pub Vec3);

impl TargetProvider for FixedTarget {
    fn position(&self) -> Vec3 {
        self.0
    }
}

/// A target following something the host moves, e.g. the player. Push the
/// tracked position with [TrackedTarget::follow] before each tick.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct TrackedTarget {
    position: Vec3,
}

impl TrackedTarget {
    pub fn new(position: Vec3) -> Self {
        Self { position }
    }

    pub fn follow(&mut self, position: Vec3) {
        self.position = position;
    }
}

impl TargetProvider for TrackedTarget {
    fn position(&self) -> Vec3 {
        self.position
    }
}

/// Picks reachable points near a center, e.g. by sampling a navigation
/// mesh. Returning `None` means no reachable point was found this time.
pub trait PointSampler {
    fn sample(&mut self, center: Vec3, range: f32, rng: &mut StdRng) -> Option<Vec3>;
}

/// Uniform samples from a horizontal disk. Every point is reachable.
#[derive(Debug, Default, Copy, Clone)]
pub struct DiskSampler;

impl PointSampler for DiskSampler {
    fn sample(&mut self, center: Vec3, range: f32, rng: &mut StdRng) -> Option<Vec3> {
        let offset = random_in_disk(rng) * range;
        Some(center + Vec3::new(offset.x, 0.0, offset.y))
    }
}

/// Moves a spawn point onto walkable ground, e.g. the nearest point on a
/// navigation mesh. Returning `None` leaves the point where it is.
pub trait PositionCorrector {
    fn correct(&mut self, position: Vec3) -> Option<Vec3>;
}

impl<F: FnMut(Vec3) -> Option<Vec3>> PositionCorrector for F {
    fn correct(&mut self, position: Vec3) -> Option<Vec3> {
        self(position)
    }
}

/// Accepts every point as it is.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoCorrection;

impl PositionCorrector for NoCorrection {
    fn correct(&mut self, position: Vec3) -> Option<Vec3> {
        Some(position)
    }
}

/// Uniform random point inside the unit disk.
pub(crate) fn random_in_disk(rng: &mut StdRng) -> Vec2 {
    let radius = rng.random::<f32>().sqrt();
    let angle = rng.random_range(0.0..TAU);
    Vec2::new(angle.cos(), angle.sin()) * radius
}

/// Timing for a [RoamingTarget].
#[derive(Debug, Copy, Clone, PartialEq, Derivative)]
#[derivative(Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct RoamingSettings {
    /// How far from the flock origin a new target may be.
    #[derivative(Default(value = "30.0"))]
    pub range: f32,
    /// Seconds to wait before picking a new target.
    #[derivative(Default(value = "4.0"))]
    pub cooldown: f32,
}

/// A target that periodically moves to a random reachable point around
/// the flock origin. If the sampler fails, it retries on the next tick.
#[derive(Debug, Clone)]
pub struct RoamingTarget<S = DiskSampler> {
    position: Vec3,
    settings: RoamingSettings,
    elapsed: f32,
    sampler: S,
}

impl RoamingTarget<DiskSampler> {
    pub fn new(start: Vec3, settings: RoamingSettings) -> Self {
        Self::with_sampler(start, settings, DiskSampler)
    }
}

impl<S: PointSampler> RoamingTarget<S> {
    /// Roam using a custom sampler, e.g. one backed by a navigation mesh.
    pub fn with_sampler(start: Vec3, settings: RoamingSettings, sampler: S) -> Self {
        Self {
            position: start,
            settings,
            elapsed: 0.0,
            sampler,
        }
    }
}

impl<S: PointSampler> TargetProvider for RoamingTarget<S> {
    fn update(&mut self, dt: f32, origin: Vec3, rng: &mut StdRng) {
        self.elapsed += dt;
        if self.elapsed < self.settings.cooldown {
            return;
        }
        if let Some(next) = self.sampler.sample(origin, self.settings.range, rng) {
            self.position = next;
            self.elapsed = 0.0;
        }
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}
