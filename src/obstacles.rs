use std::f32::consts::PI;

use bevy::math::{Mat3, Vec3};

/// Sweeps a sphere through the world to find obstructions. This is how
/// the flock sees static geometry; agents never probe each other.
pub trait ObstacleProbe {
    /// Cast a sphere of `radius` from `origin` along the unit `direction`.
    /// Returns the distance to the first obstruction within
    /// `max_distance`, or `None` when the path is clear.
    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<f32>;

    fn is_blocked(&self, origin: Vec3, radius: f32, direction: Vec3, max_distance: f32) -> bool {
        self.cast_sphere(origin, radius, direction, max_distance)
            .is_some()
    }
}

impl<F> ObstacleProbe for F
where
    F: Fn(Vec3, f32, Vec3, f32) -> Option<f32>,
{
    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<f32> {
        self(origin, radius, direction, max_distance)
    }
}

/// An empty world. Every probe is clear.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoObstacles;

impl ObstacleProbe for NoObstacles {
    fn cast_sphere(&self, _: Vec3, _: f32, _: Vec3, _: f32) -> Option<f32> {
        None
    }
}

/// Escape directions checked when the path ahead is blocked, in
/// agent-local space where `+Z` is forward and `+Y` is up. Generated once
/// with a golden-ratio spiral, so they are spread evenly over the unit
/// sphere and ordered from straight ahead towards straight behind.
#[derive(Debug, Clone, PartialEq)]
pub struct AvoidanceDirections(Vec<Vec3>);

impl AvoidanceDirections {
    pub const DEFAULT_COUNT: usize = 300;

    pub fn new(count: usize) -> Self {
        let golden_ratio = (1.0 + 5.0_f32.sqrt()) / 2.0;
        let angle_increment = 2.0 * PI * golden_ratio;
        let directions = (0..count)
            .map(|i| {
                let t = i as f32 / count as f32;
                let inclination = (1.0 - 2.0 * t).acos();
                let azimuth = angle_increment * i as f32;
                Vec3::new(
                    inclination.sin() * azimuth.cos(),
                    inclination.sin() * azimuth.sin(),
                    inclination.cos(),
                )
            })
            .collect();
        Self(directions)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn local(&self) -> &[Vec3] {
        &self.0
    }

    /// Directions rotated into world space for an agent facing `forward`,
    /// in generation order.
    pub fn world(&self, forward: Vec3) -> impl Iterator<Item = Vec3> + '_ {
        let basis = local_basis(forward);
        self.0.iter().map(move |dir| basis * *dir)
    }
}

impl Default for AvoidanceDirections {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COUNT)
    }
}

/// Rotation taking agent-local axes to world axes.
pub(crate) fn local_basis(forward: Vec3) -> Mat3 {
    let forward = forward.normalize_or_zero();
    let right = Vec3::Y.cross(forward).normalize_or_zero();
    if forward == Vec3::ZERO || right == Vec3::ZERO {
        return Mat3::IDENTITY;
    }
    let up = forward.cross(right);
    Mat3::from_cols(right, up, forward)
}
