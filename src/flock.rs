use std::f32::consts::TAU;

use bevy::{
    log::{debug, info, warn},
    math::Vec3,
};
use derivative::Derivative;
use rand::{Rng, SeedableRng, rngs::StdRng};
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    agent::{AgentId, FlockAgent},
    behaviors::{SteeringContext, avoid::AvoidanceSettings},
    control::{BehaviorType, BehaviorWeights, SteeringOutputs},
    neighbors::{BruteForceNeighbors, NeighborQuery},
    obstacles::{AvoidanceDirections, ObstacleProbe},
    target::{FixedTarget, NoCorrection, PositionCorrector, TargetProvider, random_in_disk},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlockError {
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),
    #[error("invalid flock configuration: {0}")]
    InvalidConfig(String),
}

/// Settings for a [Flock].
#[derive(Debug, Clone, PartialEq, Derivative)]
#[derivative(Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct FlockConfig {
    /// How many agents to spawn when the flock is created.
    #[derivative(Default(value = "5"))]
    pub start_count: usize,
    /// Agents spawn in a disk of radius `agent_density * start_count`
    /// around the flock origin.
    #[derivative(Default(value = "0.3"))]
    pub agent_density: f32,
    /// Spawn height relative to the flock origin.
    #[derivative(Default(value = "0.0"))]
    pub spawn_height: f32,
    /// Every agent moves at exactly this speed while flocking.
    #[derivative(Default(value = "10.0"))]
    pub max_speed: f32,
    pub weights: BehaviorWeights,
    /// Agents closer than this are neighbors.
    #[derivative(Default(value = "2.0"))]
    pub neighbor_radius: f32,
    /// Fraction [0.0, 1.0] of the neighbor radius within which
    /// neighbors are pushed away.
    #[derivative(Default(value = "0.5"))]
    pub avoidance_radius_multiplier: f32,
    /// Target seeking stops within this distance of the target.
    #[derivative(Default(value = "15.0"))]
    pub target_threshold: f32,
    pub avoidance: AvoidanceSettings,
    /// Number of escape directions tried when the way ahead is blocked.
    #[derivative(Default(value = "AvoidanceDirections::DEFAULT_COUNT"))]
    pub avoidance_directions: usize,
    /// Agents below this height are removed from the flock.
    #[derivative(Default(value = "-5.0"))]
    pub death_height: f32,
    /// Seed for spawning and random cohesion. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl FlockConfig {
    /// Set how many agents spawn when the flock is created.
    pub fn with_start_count(mut self, count: usize) -> Self {
        self.start_count = count;
        self
    }

    /// Set how tightly agents are packed at spawn. The spawn disk grows
    /// with the number of agents.
    pub fn with_agent_density(mut self, density: f32) -> Self {
        self.agent_density = density;
        self
    }

    /// Set the spawn height, relative to the flock origin.
    pub fn with_spawn_height(mut self, height: f32) -> Self {
        self.spawn_height = height;
        self
    }

    /// Set the speed every agent moves at.
    pub fn with_max_speed(mut self, speed: f32) -> Self {
        self.max_speed = speed;
        self
    }

    /// Set the weight of a single behavior. Clamped to
    /// [0.0, BehaviorWeights::MAX]; zero turns the behavior off.
    pub fn with_weight(mut self, behavior: BehaviorType, weight: f32) -> Self {
        self.weights.set(behavior, weight);
        self
    }

    /// Replace all behavior weights at once.
    pub fn with_weights(mut self, weights: BehaviorWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the radius within which other agents count as neighbors.
    pub fn with_neighbor_radius(mut self, radius: f32) -> Self {
        self.neighbor_radius = radius;
        self
    }

    /// Set the fraction of the neighbor radius within which neighbors
    /// are pushed away.
    pub fn with_avoidance_radius_multiplier(mut self, multiplier: f32) -> Self {
        self.avoidance_radius_multiplier = multiplier;
        self
    }

    /// Set how close to the target the flock stops seeking it.
    pub fn with_target_threshold(mut self, threshold: f32) -> Self {
        self.target_threshold = threshold;
        self
    }

    /// Set the obstacle probe settings.
    pub fn with_avoidance(mut self, avoidance: AvoidanceSettings) -> Self {
        self.avoidance = avoidance;
        self
    }

    /// Set how many escape directions are tried around obstacles. More
    /// directions find narrower gaps at a higher cost per blocked agent.
    pub fn with_avoidance_directions(mut self, count: usize) -> Self {
        self.avoidance_directions = count;
        self
    }

    /// Set the height below which agents are removed.
    pub fn with_death_height(mut self, height: f32) -> Self {
        self.death_height = height;
        self
    }

    /// Seed the flock's random number generator for repeatable runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Radius within which neighbors are pushed away.
    pub fn avoidance_radius(&self) -> f32 {
        self.neighbor_radius * self.avoidance_radius_multiplier
    }

    pub fn validate(&self) -> Result<(), FlockError> {
        let invalid = |msg: String| Err(FlockError::InvalidConfig(msg));
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return invalid(format!("max_speed must be positive, got {}", self.max_speed));
        }
        if !(self.neighbor_radius.is_finite() && self.neighbor_radius > 0.0) {
            return invalid(format!(
                "neighbor_radius must be positive, got {}",
                self.neighbor_radius
            ));
        }
        if !(0.0..=1.0).contains(&self.avoidance_radius_multiplier) {
            return invalid(format!(
                "avoidance_radius_multiplier must be within [0, 1], got {}",
                self.avoidance_radius_multiplier
            ));
        }
        if !(self.agent_density.is_finite() && self.agent_density >= 0.0) {
            return invalid(format!(
                "agent_density must not be negative, got {}",
                self.agent_density
            ));
        }
        if !self.spawn_height.is_finite() {
            return invalid(format!("spawn_height must be finite, got {}", self.spawn_height));
        }
        if !(self.target_threshold.is_finite() && self.target_threshold >= 0.0) {
            return invalid(format!(
                "target_threshold must not be negative, got {}",
                self.target_threshold
            ));
        }
        let probe = self.avoidance;
        if !(probe.probe_radius.is_finite() && probe.probe_radius >= 0.0)
            || !(probe.max_distance.is_finite() && probe.max_distance >= 0.0)
        {
            return invalid(format!("avoidance probe must not be negative: {:?}", probe));
        }
        if self.death_height.is_nan() {
            return invalid("death_height must be a number".to_string());
        }
        if let Some((behavior, weight)) = self.weights.out_of_range() {
            return invalid(format!(
                "{} weight must be within [0, {}], got {}",
                behavior,
                BehaviorWeights::MAX,
                weight
            ));
        }
        Ok(())
    }
}

/// Notifications from the host, applied at the start of the next tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FlockEvent {
    /// The agent was destroyed by something outside the flock.
    AgentKilled(AgentId),
    /// The host moved the agent, e.g. after resolving a collision.
    AgentMoved { agent: AgentId, position: Vec3 },
}

/// The decision made for one agent in one tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SteeringCommand {
    pub agent: AgentId,
    pub velocity: Vec3,
    pub outputs: SteeringOutputs,
}

/// What happened during a tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    /// One command per surviving agent, in flock order.
    pub steered: Vec<SteeringCommand>,
    /// Agents removed this tick, by height check or by event.
    pub removed: Vec<AgentId>,
}

/// Owns a group of agents and steers them together. Call [Flock::tick]
/// from the simulation loop.
///
/// Each tick works on a snapshot of the agents taken at its start: every
/// agent steers against where its neighbors were, and all movement and
/// removal is applied once every decision is made. The outcome does not
/// depend on the order of the agents.
#[derive(Debug, Clone)]
pub struct Flock<N = BruteForceNeighbors, T = FixedTarget> {
    config: FlockConfig,
    origin: Vec3,
    agents: Vec<FlockAgent>,
    next_id: u64,
    neighbors: N,
    target: T,
    directions: AvoidanceDirections,
    rng: StdRng,
    pending: Vec<FlockEvent>,
    paused: bool,
}

impl<N: NeighborQuery, T: TargetProvider> Flock<N, T> {
    /// Create a flock around `origin` and spawn its starting agents.
    pub fn new(config: FlockConfig, origin: Vec3, neighbors: N, target: T) -> Result<Self, FlockError> {
        Self::with_corrector(config, origin, neighbors, target, &mut NoCorrection)
    }

    /// Like [Flock::new], but every spawn point is first passed through
    /// `corrector`, e.g. to keep agents from spawning over the void.
    pub fn with_corrector<C: PositionCorrector + ?Sized>(
        config: FlockConfig,
        origin: Vec3,
        neighbors: N,
        target: T,
        corrector: &mut C,
    ) -> Result<Self, FlockError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut flock = Self {
            directions: AvoidanceDirections::new(config.avoidance_directions),
            config,
            origin,
            agents: Vec::new(),
            next_id: 0,
            neighbors,
            target,
            rng,
            pending: Vec::new(),
            paused: false,
        };
        flock.spawn_agents(corrector);
        Ok(flock)
    }

    fn spawn_agents<C: PositionCorrector + ?Sized>(&mut self, corrector: &mut C) {
        let count = self.config.start_count;
        let spread = self.config.agent_density * count as f32;
        for _ in 0..count {
            let offset = random_in_disk(&mut self.rng) * spread;
            let position = self.origin + Vec3::new(offset.x, self.config.spawn_height, offset.y);
            let position = corrector.correct(position).unwrap_or(position);
            let yaw = self.rng.random_range(0.0..TAU);
            let forward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
            self.insert_agent(position, forward);
        }
        debug!("Spawned {} agents within {} of {}", count, spread, self.origin);
    }

    /// Add an agent to the flock. `forward` is flattened onto the
    /// horizontal plane.
    pub fn insert_agent(&mut self, position: Vec3, forward: Vec3) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        self.agents.push(FlockAgent::new(id, position, forward));
        id
    }

    /// Remove an agent immediately.
    pub fn remove_agent(&mut self, id: AgentId) -> Result<FlockAgent, FlockError> {
        let index = self
            .agents
            .iter()
            .position(|agent| agent.id == id)
            .ok_or(FlockError::UnknownAgent(id))?;
        Ok(self.agents.remove(index))
    }

    /// Queue a host event for the next tick.
    pub fn notify(&mut self, event: FlockEvent) {
        self.pending.push(event);
    }

    pub fn agents(&self) -> &[FlockAgent] {
        &self.agents
    }

    pub fn agent(&self, id: AgentId) -> Option<&FlockAgent> {
        self.agents.iter().find(|agent| agent.id == id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    /// Change a behavior weight while the flock is running.
    pub fn set_weight(&mut self, behavior: BehaviorType, weight: f32) {
        self.config.weights.set(behavior, weight);
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn directions(&self) -> &AvoidanceDirections {
        &self.directions
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// A paused flock ignores ticks entirely. Queued events wait.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Advance the flock by `dt` seconds.
    pub fn tick<P: ObstacleProbe + ?Sized>(&mut self, dt: f32, probe: &P) -> TickReport {
        let mut report = TickReport::default();
        if self.paused {
            return report;
        }
        if !(dt.is_finite() && dt >= 0.0) {
            warn!("Ignoring flock tick with invalid dt {}", dt);
            return report;
        }

        self.apply_events(&mut report);
        self.target.update(dt, self.origin, &mut self.rng);
        let target = self.target.position();

        let snapshot = self.agents.clone();
        self.neighbors.rebuild(&snapshot);

        for (index, agent) in snapshot.iter().enumerate() {
            if agent.position.y < self.config.death_height {
                info!("{} fell below {} and died", agent.id, self.config.death_height);
                report.removed.push(agent.id);
                continue;
            }

            let neighbors = self
                .neighbors
                .find_neighbors(&snapshot, index, self.config.neighbor_radius)
                .into_iter()
                .filter_map(|j| snapshot.get(j))
                .collect::<Vec<_>>();
            let ctx = SteeringContext {
                agent,
                neighbors: &neighbors,
                flock: &snapshot,
                config: &self.config,
                target,
                directions: &self.directions,
            };

            let mut outputs = SteeringOutputs::default();
            for (behavior, _) in self.config.weights.active() {
                outputs.set(behavior, behavior.steer(&ctx, probe, &mut self.rng));
            }
            let velocity =
                outputs.into_velocity(&self.config.weights, agent.forward, self.config.max_speed);
            report.steered.push(SteeringCommand {
                agent: agent.id,
                velocity,
                outputs,
            });
        }

        if !report.removed.is_empty() {
            self.agents.retain(|agent| !report.removed.contains(&agent.id));
        }
        for (agent, command) in self.agents.iter_mut().zip(&report.steered) {
            debug_assert_eq!(agent.id, command.agent);
            agent.move_by(command.velocity, dt);
        }

        debug!(
            "Flock tick: {} steered, {} removed",
            report.steered.len(),
            report.removed.len()
        );
        report
    }

    fn apply_events(&mut self, report: &mut TickReport) {
        for event in std::mem::take(&mut self.pending) {
            match event {
                FlockEvent::AgentKilled(id) => match self.remove_agent(id) {
                    Ok(agent) => {
                        info!("{} died", agent.id);
                        report.removed.push(id);
                    }
                    Err(err) => warn!("Ignoring kill event: {}", err),
                },
                FlockEvent::AgentMoved { agent, position } => {
                    match self.agents.iter_mut().find(|a| a.id == agent) {
                        Some(a) => a.set_position(position),
                        None => warn!("Ignoring move event: {}", FlockError::UnknownAgent(agent)),
                    }
                }
            }
        }
    }
}
