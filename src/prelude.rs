pub use crate::{
    agent::{AgentId, FlockAgent},
    behaviors::{SteeringContext, avoid::AvoidanceSettings},
    control::{BehaviorType, BehaviorWeights, SteeringOutputs},
    flock::{Flock, FlockConfig, FlockError, FlockEvent, SteeringCommand, TickReport},
    neighbors::{BruteForceNeighbors, GridNeighbors, NeighborQuery},
    obstacles::{AvoidanceDirections, NoObstacles, ObstacleProbe},
    plugin::{
        AvianObstacleProbe, DebugFlockingPlugin, FlockController, FlockMember, FlockMemberKilled,
        FlockTarget, FlockingPlugin, FlockingSystemSet, PluginFlock,
    },
    target::{
        DiskSampler, FixedTarget, NoCorrection, PointSampler, PositionCorrector, RoamingSettings,
        RoamingTarget, TargetProvider, TrackedTarget,
    },
};
