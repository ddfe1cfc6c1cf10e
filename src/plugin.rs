use avian3d::prelude::*;
use bevy::{ecs::query::QueryData, platform::collections::HashMap, prelude::*};

use crate::{
    SMALL_THRESHOLD,
    agent::AgentId,
    flock::{Flock, FlockConfig, FlockEvent, TickReport},
    neighbors::GridNeighbors,
    obstacles::ObstacleProbe,
    target::{FixedTarget, RoamingSettings, RoamingTarget, TargetProvider, TrackedTarget},
};

/// Where a flock spawned by the plugin is heading.
#[derive(Debug, Clone)]
pub enum FlockTarget {
    Fixed(FixedTarget),
    Roaming(RoamingTarget),
    /// Follow another entity's position.
    Tracked {
        entity: Entity,
        target: TrackedTarget,
    },
}

impl FlockTarget {
    pub fn fixed(position: Vec3) -> Self {
        Self::Fixed(FixedTarget(position))
    }

    pub fn roaming(start: Vec3, settings: RoamingSettings) -> Self {
        Self::Roaming(RoamingTarget::new(start, settings))
    }

    pub fn tracked(entity: Entity) -> Self {
        Self::Tracked {
            entity,
            target: TrackedTarget::default(),
        }
    }
}

impl TargetProvider for FlockTarget {
    fn update(&mut self, dt: f32, origin: Vec3, rng: &mut rand::rngs::StdRng) {
        match self {
            FlockTarget::Fixed(target) => target.update(dt, origin, rng),
            FlockTarget::Roaming(target) => target.update(dt, origin, rng),
            FlockTarget::Tracked { target, .. } => target.update(dt, origin, rng),
        }
    }

    fn position(&self) -> Vec3 {
        match self {
            FlockTarget::Fixed(target) => target.position(),
            FlockTarget::Roaming(target) => target.position(),
            FlockTarget::Tracked { target, .. } => target.position(),
        }
    }
}

/// The flock type driven by [FlockController].
pub type PluginFlock = Flock<GridNeighbors, FlockTarget>;

/// Spawns and steers a flock around this entity. The flock is created
/// on the first fixed update after the component is added, at the
/// entity's position; each agent gets its own entity with a
/// [FlockMember] component and a [Transform] kept in sync.
///
/// Members are steered by the flock, but the host may still move them,
/// e.g. with physics. Such moves are fed back into the flock before the
/// next tick, so a member pushed below the death height is removed.
#[derive(Component, Reflect)]
#[require(Transform)]
#[reflect(Component)]
pub struct FlockController {
    #[reflect(ignore)]
    config: FlockConfig,
    #[reflect(ignore)]
    pending_target: Option<FlockTarget>,
    #[reflect(ignore)]
    pub(crate) flock: Option<PluginFlock>,
    #[reflect(ignore)]
    pub(crate) members: HashMap<AgentId, Entity>,
    #[reflect(ignore)]
    pub(crate) last_report: TickReport,
    /// Layers the obstacle probe collides with.
    pub obstacle_mask: LayerMask,
    /// A paused flock stays where it is.
    pub paused: bool,
}

impl FlockController {
    pub fn new(config: FlockConfig, target: FlockTarget) -> Self {
        Self {
            config,
            pending_target: Some(target),
            flock: None,
            members: HashMap::default(),
            last_report: TickReport::default(),
            obstacle_mask: LayerMask::DEFAULT,
            paused: false,
        }
    }

    /// Set the layers the obstacle probe collides with. Members of this
    /// flock are never treated as obstacles.
    pub fn with_obstacle_mask(mut self, mask: LayerMask) -> Self {
        self.obstacle_mask = mask;
        self
    }

    pub fn flock(&self) -> Option<&PluginFlock> {
        self.flock.as_ref()
    }

    pub fn flock_mut(&mut self) -> Option<&mut PluginFlock> {
        self.flock.as_mut()
    }

    /// The entity mirroring an agent, if it is still alive.
    pub fn member(&self, agent: AgentId) -> Option<Entity> {
        self.members.get(&agent).copied()
    }

    pub fn last_report(&self) -> &TickReport {
        &self.last_report
    }

    /// Spatial query filter for the obstacle probe.
    pub(crate) fn obstacle_filter(&self) -> SpatialQueryFilter {
        SpatialQueryFilter::default()
            .with_mask(self.obstacle_mask)
            .with_excluded_entities(self.members.values().copied())
    }

    /// Events for members the host has moved since the last sync.
    fn host_moves(&self, transforms: &Query<&Transform, With<FlockMember>>) -> Vec<FlockEvent> {
        let Some(flock) = self.flock() else {
            return Vec::new();
        };
        flock
            .agents()
            .iter()
            .filter_map(|agent| {
                let entity = self.member(agent.id())?;
                let position = transforms.get(entity).ok()?.translation;
                (!position.abs_diff_eq(agent.position(), SMALL_THRESHOLD)).then_some(
                    FlockEvent::AgentMoved {
                        agent: agent.id(),
                        position,
                    },
                )
            })
            .collect()
    }
}

/// Marks an entity that mirrors one agent of a flock.
#[derive(Component, Debug, Copy, Clone, Reflect)]
#[require(Transform)]
#[reflect(Component)]
pub struct FlockMember {
    pub controller: Entity,
    pub agent: AgentId,
}

/// Write this message to kill a flock member, e.g. when it is shot.
#[derive(Message, Debug, Copy, Clone)]
pub struct FlockMemberKilled(pub Entity);

/// Sphere casts against the avian3d spatial query.
pub struct AvianObstacleProbe<'a, 'w, 's> {
    spatial_query: &'a SpatialQuery<'w, 's>,
    filter: SpatialQueryFilter,
}

impl<'a, 'w, 's> AvianObstacleProbe<'a, 'w, 's> {
    pub fn new(spatial_query: &'a SpatialQuery<'w, 's>, filter: SpatialQueryFilter) -> Self {
        Self {
            spatial_query,
            filter,
        }
    }
}

impl ObstacleProbe for AvianObstacleProbe<'_, '_, '_> {
    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<f32> {
        let direction = Dir3::new(direction).ok()?;
        let shape = Collider::sphere(radius);
        self.spatial_query
            .cast_shape(
                &shape,
                origin,
                Quat::IDENTITY,
                direction,
                &ShapeCastConfig {
                    max_distance,
                    ..Default::default()
                },
                &self.filter,
            )
            .map(|hit| hit.distance)
    }
}

#[derive(QueryData)]
#[query_data(mutable)]
pub(crate) struct InitFlockQuery {
    entity: Entity,
    controller: &'static mut FlockController,
    transform: &'static GlobalTransform,
}

pub(crate) fn init_flocks(mut query: Query<InitFlockQuery>, mut commands: Commands) {
    for mut item in query.iter_mut() {
        let Some(target) = item.controller.pending_target.take() else {
            continue;
        };
        let config = item.controller.config.clone();
        let grid = GridNeighbors::new(config.neighbor_radius);
        let origin = item.transform.translation();
        let flock = match Flock::new(config, origin, grid, target) {
            Ok(flock) => flock,
            Err(err) => {
                error!("Cannot create flock for {}: {}", item.entity, err);
                continue;
            }
        };
        for agent in flock.agents() {
            let member = commands
                .spawn((
                    FlockMember {
                        controller: item.entity,
                        agent: agent.id(),
                    },
                    Transform::from_translation(agent.position())
                        .looking_to(agent.forward(), Vec3::Y),
                ))
                .id();
            item.controller.members.insert(agent.id(), member);
        }
        info!("Spawned flock of {} agents at {}", flock.len(), origin);
        item.controller.flock = Some(flock);
    }
}

pub(crate) fn forward_killed_members(
    mut messages: MessageReader<FlockMemberKilled>,
    members: Query<&FlockMember>,
    mut controllers: Query<&mut FlockController>,
) {
    for FlockMemberKilled(entity) in messages.read() {
        let Ok(member) = members.get(*entity) else {
            warn!("{} is not a flock member", entity);
            continue;
        };
        let Ok(mut controller) = controllers.get_mut(member.controller) else {
            continue;
        };
        if let Some(flock) = controller.flock.as_mut() {
            flock.notify(FlockEvent::AgentKilled(member.agent));
        }
    }
}

#[derive(QueryData)]
#[query_data(mutable)]
pub(crate) struct TickFlockQuery {
    controller: &'static mut FlockController,
    transform: &'static GlobalTransform,
}

pub(crate) fn tick_flocks(
    mut query: Query<TickFlockQuery>,
    tracked: Query<&GlobalTransform, Without<FlockController>>,
    member_transforms: Query<&Transform, With<FlockMember>>,
    spatial_query: SpatialQuery,
    time: Res<Time>,
    mut commands: Commands,
) {
    let dt = time.delta_secs();
    for item in query.iter_mut() {
        let controller = item.controller.into_inner();
        let moved = if controller.paused {
            Vec::new()
        } else {
            controller.host_moves(&member_transforms)
        };
        let filter = controller.obstacle_filter();
        let Some(flock) = controller.flock.as_mut() else {
            continue;
        };
        for event in moved {
            flock.notify(event);
        }
        flock.set_paused(controller.paused);
        flock.set_origin(item.transform.translation());
        if let FlockTarget::Tracked { entity, target } = flock.target_mut() {
            match tracked.get(*entity) {
                Ok(transform) => target.follow(transform.translation()),
                Err(_) => warn!("Tracked target {} is gone", entity),
            }
        }

        let probe = AvianObstacleProbe::new(&spatial_query, filter);
        let report = flock.tick(dt, &probe);

        for agent in &report.removed {
            if let Some(member) = controller.members.remove(agent) {
                commands.entity(member).despawn();
            }
        }
        controller.last_report = report;
    }
}

pub(crate) fn sync_members(
    controllers: Query<&FlockController>,
    mut members: Query<&mut Transform, With<FlockMember>>,
) {
    for controller in controllers.iter() {
        let Some(flock) = controller.flock() else {
            continue;
        };
        for agent in flock.agents() {
            let Some(mut transform) = controller
                .member(agent.id())
                .and_then(|entity| members.get_mut(entity).ok())
            else {
                continue;
            };
            transform.translation = agent.position();
            transform.look_to(agent.forward(), Vec3::Y);
        }
    }
}

/// Draw each flock's target, the neighborhood of its agents, and the
/// velocity they were last given.
pub(crate) fn debug_flocks(mut gizmos: Gizmos, controllers: Query<&FlockController>) {
    const TARGET_COLOR: Color = Color::srgb(1.0, 0.0, 0.0);
    const NEIGHBORHOOD_COLOR: Color = Color::srgba(0.0, 1.0, 1.0, 0.3);
    const VELOCITY_COLOR: Color = Color::srgb(0.0, 1.0, 0.0);

    for controller in controllers.iter() {
        let Some(flock) = controller.flock() else {
            continue;
        };
        gizmos.sphere(flock.target().position(), 0.5, TARGET_COLOR);
        let radius = flock.config().neighbor_radius;
        for agent in flock.agents() {
            gizmos.sphere(agent.position(), radius, NEIGHBORHOOD_COLOR);
        }
        // Survivors of a tick keep the order of its commands.
        let steered = flock.agents().iter().zip(&controller.last_report.steered);
        for (agent, command) in steered.filter(|(agent, command)| agent.id() == command.agent) {
            let start = agent.position();
            gizmos.arrow(start, start + command.velocity * 0.2, VELOCITY_COLOR);
        }
    }
}

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub struct FlockingSystemSet;

pub struct FlockingPlugin;

impl Plugin for FlockingPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<FlockMemberKilled>();
        let update_systems = (init_flocks, forward_killed_members, tick_flocks, sync_members)
            .chain()
            .in_set(FlockingSystemSet);
        app.add_systems(FixedUpdate, update_systems);
    }
}

pub struct DebugFlockingPlugin;

impl Plugin for DebugFlockingPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, debug_flocks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::{
        MinimalPlugins,
        asset::{AssetEvent, AssetPlugin, Assets},
        ecs::system::RunSystemOnce,
        prelude::{App, Mesh, Transform, Vec3},
        scene::ScenePlugin,
        transform::TransformPlugin,
    };

    fn run_app_test<T>(setup: impl FnOnce(&mut App) -> T) -> (App, T) {
        let mut app = App::new();

        app.add_plugins((
            MinimalPlugins,
            AssetPlugin::default(),
            ScenePlugin,
            TransformPlugin,
            // Force the physics onto the Update schedule during tests
            PhysicsPlugins::new(Update),
        ));

        app.init_resource::<Assets<Mesh>>();
        app.add_message::<AssetEvent<Mesh>>();
        app.add_message::<FlockMemberKilled>();

        let result = setup(&mut app);

        for _ in 0..10 {
            app.finish();
            app.cleanup();
            app.update();
        }

        (app, result)
    }

    fn config() -> FlockConfig {
        FlockConfig::default().with_start_count(6).with_seed(17)
    }

    fn members_of(app: &mut App, controller: Entity) -> Vec<(Entity, FlockMember)> {
        let mut query = app.world_mut().query::<(Entity, &FlockMember)>();
        query
            .iter(app.world())
            .filter(|(_, member)| member.controller == controller)
            .map(|(entity, member)| (entity, *member))
            .collect()
    }

    #[test]
    fn test_init_spawns_members() {
        let (mut app, controller) = run_app_test(|app| {
            app.world_mut()
                .spawn((
                    Transform::from_translation(Vec3::new(3.0, 0.0, 3.0)),
                    FlockController::new(config(), FlockTarget::fixed(Vec3::ZERO)),
                ))
                .id()
        });

        app.world_mut()
            .run_system_once(init_flocks)
            .expect("Failed to run init_flocks system");

        let members = members_of(&mut app, controller);
        assert_eq!(members.len(), 6);

        let flock_controller = app.world().get::<FlockController>(controller).unwrap();
        let flock = flock_controller.flock().unwrap();
        assert_eq!(flock.origin(), Vec3::new(3.0, 0.0, 3.0));
        for (entity, member) in members {
            assert_eq!(flock_controller.member(member.agent), Some(entity));
            let transform = app.world().get::<Transform>(entity).unwrap();
            let agent = flock.agent(member.agent).unwrap();
            assert_eq!(transform.translation, agent.position());
        }
    }

    #[test]
    fn test_init_reports_invalid_config() {
        let (mut app, controller) = run_app_test(|app| {
            app.world_mut()
                .spawn(FlockController::new(
                    config().with_max_speed(-1.0),
                    FlockTarget::fixed(Vec3::ZERO),
                ))
                .id()
        });

        app.world_mut()
            .run_system_once(init_flocks)
            .expect("Failed to run init_flocks system");

        assert!(members_of(&mut app, controller).is_empty());
        let flock_controller = app.world().get::<FlockController>(controller).unwrap();
        assert!(flock_controller.flock().is_none());
    }

    #[test]
    fn test_tick_moves_members() {
        let (mut app, controller) = run_app_test(|app| {
            app.world_mut()
                .spawn(FlockController::new(
                    config(),
                    FlockTarget::fixed(Vec3::ZERO),
                ))
                .id()
        });

        app.world_mut()
            .run_system_once(init_flocks)
            .expect("Failed to run init_flocks system");
        app.world_mut()
            .run_system_once(tick_flocks)
            .expect("Failed to run tick_flocks system");
        app.world_mut()
            .run_system_once(sync_members)
            .expect("Failed to run sync_members system");

        let members = members_of(&mut app, controller);
        let flock_controller = app.world().get::<FlockController>(controller).unwrap();
        assert_eq!(flock_controller.last_report().steered.len(), 6);
        let flock = flock_controller.flock().unwrap();
        for (entity, member) in members {
            let transform = app.world().get::<Transform>(entity).unwrap();
            let agent = flock.agent(member.agent).unwrap();
            assert!(!transform.translation.is_nan());
            assert!(transform.translation.abs_diff_eq(agent.position(), 0.0001));
        }
    }

    #[test]
    fn test_fallen_member_is_despawned() {
        let (mut app, controller) = run_app_test(|app| {
            app.world_mut()
                .spawn(FlockController::new(
                    config(),
                    FlockTarget::fixed(Vec3::ZERO),
                ))
                .id()
        });

        app.world_mut()
            .run_system_once(init_flocks)
            .expect("Failed to run init_flocks system");
        let members = members_of(&mut app, controller);
        let (victim, fallen) = members[0];
        let (pushed, shoved) = members[1];
        let pushed_to = Vec3::new(20.0, 0.0, 20.0);
        app.world_mut()
            .get_mut::<Transform>(victim)
            .unwrap()
            .translation
            .y = -50.0;
        app.world_mut()
            .get_mut::<Transform>(pushed)
            .unwrap()
            .translation = pushed_to;

        app.world_mut()
            .run_system_once(tick_flocks)
            .expect("Failed to run tick_flocks system");
        app.world_mut()
            .run_system_once(sync_members)
            .expect("Failed to run sync_members system");

        assert!(app.world().get_entity(victim).is_err());
        assert_eq!(members_of(&mut app, controller).len(), 5);
        let flock_controller = app.world().get::<FlockController>(controller).unwrap();
        assert_eq!(flock_controller.last_report().removed, vec![fallen.agent]);
        let flock = flock_controller.flock().unwrap();
        assert!(flock.agent(fallen.agent).is_none());

        // Sideways moves are kept too; the agent steers on from there.
        let agent = flock.agent(shoved.agent).unwrap();
        assert!(agent.position().distance(pushed_to) < 3.0, "{:?}", agent.position());
        let transform = app.world().get::<Transform>(pushed).unwrap();
        assert_eq!(transform.translation, agent.position());
    }

    #[test]
    fn test_avian_sphere_cast_hits_colliders() {
        let (mut app, wall) = run_app_test(|app| {
            app.world_mut()
                .spawn((
                    Transform::from_xyz(0.0, 0.0, 5.0),
                    RigidBody::Static,
                    Collider::cuboid(4.0, 4.0, 1.0),
                ))
                .id()
        });

        let mut cast = |filter: SpatialQueryFilter, direction: Vec3| {
            app.world_mut()
                .run_system_once(move |spatial_query: SpatialQuery| {
                    AvianObstacleProbe::new(&spatial_query, filter.clone())
                        .cast_sphere(Vec3::ZERO, 0.5, direction, 10.0)
                })
                .expect("Failed to run sphere cast")
        };

        let hit = cast(SpatialQueryFilter::default(), Vec3::Z);
        assert!(
            hit.is_some_and(|distance| distance > 3.5 && distance < 4.5),
            "Expected a hit about 4 units ahead, got {:?}",
            hit
        );
        assert_eq!(cast(SpatialQueryFilter::default(), Vec3::X), None);
        assert_eq!(
            cast(SpatialQueryFilter::default().with_excluded_entities([wall]), Vec3::Z),
            None
        );
        assert_eq!(
            cast(SpatialQueryFilter::default().with_mask(LayerMask(0b10)), Vec3::Z),
            None
        );
        assert_eq!(cast(SpatialQueryFilter::default(), Vec3::ZERO), None);
    }

    #[test]
    fn test_obstacle_filter_skips_members_and_masked_layers() {
        let (mut app, (controller, wall_origin)) = run_app_test(|app| {
            let wall_origin = Vec3::new(100.0, 0.0, 0.0);
            app.world_mut().spawn((
                Transform::from_translation(wall_origin + Vec3::new(0.0, 0.0, 5.0)),
                RigidBody::Static,
                Collider::cuboid(4.0, 4.0, 1.0),
            ));
            let controller = app
                .world_mut()
                .spawn(FlockController::new(
                    config(),
                    FlockTarget::fixed(Vec3::ZERO),
                ))
                .id();
            (controller, wall_origin)
        });

        app.world_mut()
            .run_system_once(init_flocks)
            .expect("Failed to run init_flocks system");
        let (member, _) = members_of(&mut app, controller)[0];
        let member_position = app.world().get::<Transform>(member).unwrap().translation;
        app.world_mut()
            .entity_mut(member)
            .insert((RigidBody::Static, Collider::sphere(0.5)));
        for _ in 0..10 {
            app.update();
        }

        let member_filter = app
            .world()
            .get::<FlockController>(controller)
            .unwrap()
            .obstacle_filter();
        let masked_filter = FlockController::new(config(), FlockTarget::fixed(Vec3::ZERO))
            .with_obstacle_mask(LayerMask(0b10))
            .obstacle_filter();

        let mut cast = |filter: SpatialQueryFilter, origin: Vec3| {
            app.world_mut()
                .run_system_once(move |spatial_query: SpatialQuery| {
                    AvianObstacleProbe::new(&spatial_query, filter.clone())
                        .cast_sphere(origin, 0.2, Vec3::Z, 10.0)
                })
                .expect("Failed to run sphere cast")
        };

        let behind_member = member_position - Vec3::new(0.0, 0.0, 3.0);
        assert!(cast(SpatialQueryFilter::default(), behind_member).is_some());
        assert_eq!(cast(member_filter.clone(), behind_member), None);
        assert!(cast(member_filter, wall_origin).is_some());
        assert_eq!(cast(masked_filter, wall_origin), None);
    }

    #[test]
    fn test_killed_member_is_despawned() {
        let (mut app, controller) = run_app_test(|app| {
            app.world_mut()
                .spawn(FlockController::new(
                    config(),
                    FlockTarget::fixed(Vec3::ZERO),
                ))
                .id()
        });

        app.world_mut()
            .run_system_once(init_flocks)
            .expect("Failed to run init_flocks system");
        let (victim, member) = members_of(&mut app, controller)[0];
        app.world_mut()
            .run_system_once(move |mut writer: MessageWriter<FlockMemberKilled>| {
                writer.write(FlockMemberKilled(victim));
            })
            .expect("Failed to write kill message");
        app.world_mut()
            .run_system_once(forward_killed_members)
            .expect("Failed to run forward_killed_members system");
        app.world_mut()
            .run_system_once(tick_flocks)
            .expect("Failed to run tick_flocks system");

        assert!(app.world().get_entity(victim).is_err());
        assert_eq!(members_of(&mut app, controller).len(), 5);
        let flock_controller = app.world().get::<FlockController>(controller).unwrap();
        assert_eq!(flock_controller.last_report().removed, vec![member.agent]);
        assert!(flock_controller.member(member.agent).is_none());
    }
}
