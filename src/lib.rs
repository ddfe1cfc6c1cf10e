mod agent;
pub mod behaviors;
mod control;
mod flock;
mod neighbors;
mod obstacles;
mod plugin;
pub mod prelude;
mod target;

pub(crate) const SMALL_THRESHOLD: f32 = 0.0001;
