use bevy::{math::Vec3, platform::collections::HashMap};
use itertools::iproduct;

use crate::agent::FlockAgent;

/// A broad-phase index answering "which agents are near this one". The
/// flock rebuilds the index from its tick-start snapshot, then asks for
/// the neighbors of each agent in turn. Results are snapshot indices.
pub trait NeighborQuery {
    /// Rebuild internal structures from the current snapshot.
    fn rebuild(&mut self, snapshot: &[FlockAgent]);

    /// Indices of all agents in `snapshot` within `radius` of the agent at
    /// `index`, excluding that agent itself. An empty result is valid.
    fn find_neighbors(&self, snapshot: &[FlockAgent], index: usize, radius: f32) -> Vec<usize>;
}

impl<N: NeighborQuery + ?Sized> NeighborQuery for Box<N> {
    fn rebuild(&mut self, snapshot: &[FlockAgent]) {
        (**self).rebuild(snapshot);
    }

    fn find_neighbors(&self, snapshot: &[FlockAgent], index: usize, radius: f32) -> Vec<usize> {
        (**self).find_neighbors(snapshot, index, radius)
    }
}

/// Checks every pair. Fine for small flocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct BruteForceNeighbors;

impl NeighborQuery for BruteForceNeighbors {
    fn rebuild(&mut self, _snapshot: &[FlockAgent]) {}

    fn find_neighbors(&self, snapshot: &[FlockAgent], index: usize, radius: f32) -> Vec<usize> {
        let Some(agent) = snapshot.get(index) else {
            return Vec::new();
        };
        let radius_sq = radius * radius;
        snapshot
            .iter()
            .enumerate()
            .filter(|(j, other)| {
                *j != index && other.position.distance_squared(agent.position) <= radius_sq
            })
            .map(|(j, _)| j)
            .collect()
    }
}

/// Uniform spatial hash over the horizontal plane. `cell_size` should be
/// on the order of the neighbor radius. When a query would have to walk
/// more cells than are occupied, it scans the occupied cells instead.
#[derive(Debug, Clone)]
pub struct GridNeighbors {
    cell_size: f32,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl GridNeighbors {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(f32::EPSILON),
            cells: HashMap::default(),
        }
    }

    fn cell_of(&self, position: Vec3) -> (i64, i64) {
        (
            (position.x / self.cell_size).floor() as i64,
            (position.z / self.cell_size).floor() as i64,
        )
    }

    /// Candidate indices from the cells within `reach` of `center`.
    fn walk(&self, center: (i64, i64), reach: i64) -> Vec<usize> {
        let (cx, cz) = center;
        iproduct!(-reach..=reach, -reach..=reach)
            .map(|(dx, dz)| (cx.saturating_add(dx), cz.saturating_add(dz)))
            .filter_map(|cell| self.cells.get(&cell))
            .flatten()
            .copied()
            .collect()
    }
}

impl NeighborQuery for GridNeighbors {
    fn rebuild(&mut self, snapshot: &[FlockAgent]) {
        self.cells.clear();
        for (i, agent) in snapshot.iter().enumerate() {
            let cell = self.cell_of(agent.position);
            self.cells.entry(cell).or_default().push(i);
        }
    }

    fn find_neighbors(&self, snapshot: &[FlockAgent], index: usize, radius: f32) -> Vec<usize> {
        let Some(agent) = snapshot.get(index) else {
            return Vec::new();
        };
        let radius_sq = radius * radius;
        let reach = (radius / self.cell_size).ceil();
        let side = 2.0 * reach + 1.0;

        let candidates = if reach.is_finite() && side * side <= self.cells.len() as f32 {
            self.walk(self.cell_of(agent.position), reach as i64)
        } else {
            self.cells.values().flatten().copied().collect()
        };

        let mut found: Vec<usize> = candidates
            .into_iter()
            .filter(|&j| {
                j != index
                    && snapshot
                        .get(j)
                        .is_some_and(|other| other.position.distance_squared(agent.position) <= radius_sq)
            })
            .collect();
        // Keep snapshot order so results match the brute force query.
        // Saturated cells at the edge of the grid may be visited twice.
        found.sort_unstable();
        found.dedup();
        found
    }
}
