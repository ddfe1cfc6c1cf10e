use avian3d::prelude::*;
use bevy::prelude::*;
use bevy_flocking::prelude::*;

const NUM_AGENTS: usize = 30;
const ARENA_SIZE: f32 = 40.0;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(PhysicsPlugins::default())
        .add_plugins((FlockingPlugin, DebugFlockingPlugin))
        .add_systems(Startup, setup)
        .add_systems(Update, (decorate_members, toggle_pause))
        .run();
}

#[derive(Resource)]
struct AgentAssets {
    mesh: Handle<Mesh>,
    material: Handle<StandardMaterial>,
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // Ground plane
    commands.spawn((
        Mesh3d(meshes.add(Plane3d::new(Vec3::Y, Vec2::splat(ARENA_SIZE)))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.3, 0.5, 0.3),
            ..default()
        })),
        Transform::from_xyz(0.0, -0.5, 0.0),
    ));

    // A few pillars for the flock to steer around
    let pillar_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.5, 0.5, 0.6),
        ..default()
    });
    for (x, z) in [(8.0, 8.0), (-10.0, 4.0), (3.0, -12.0), (-6.0, -6.0)] {
        commands.spawn((
            Mesh3d(meshes.add(Cylinder::new(1.5, 4.0))),
            MeshMaterial3d(pillar_material.clone()),
            Transform::from_xyz(x, 1.5, z),
            RigidBody::Static,
            Collider::cylinder(1.5, 4.0),
        ));
    }

    commands.insert_resource(AgentAssets {
        mesh: meshes.add(Cuboid::new(0.4, 0.4, 0.8)),
        material: materials.add(StandardMaterial {
            base_color: Color::srgb(0.8, 0.2, 0.2),
            ..default()
        }),
    });

    let config = FlockConfig::default()
        .with_start_count(NUM_AGENTS)
        .with_max_speed(6.0)
        .with_neighbor_radius(3.0)
        .with_target_threshold(5.0)
        .with_weight(BehaviorType::ObstacleAvoidance, 3.0);
    let roaming = RoamingSettings {
        range: ARENA_SIZE * 0.6,
        cooldown: 4.0,
    };
    commands.spawn((
        Transform::default(),
        FlockController::new(config, FlockTarget::roaming(Vec3::ZERO, roaming)),
    ));

    // Top-down camera
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 70.0, 0.1).looking_at(Vec3::ZERO, Vec3::Z),
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: 10000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(4.0, 8.0, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

/// Give newly spawned flock members something to look at.
fn decorate_members(
    mut commands: Commands,
    assets: Res<AgentAssets>,
    query: Query<Entity, Added<FlockMember>>,
) {
    for entity in query.iter() {
        commands.entity(entity).insert((
            Mesh3d(assets.mesh.clone()),
            MeshMaterial3d(assets.material.clone()),
        ));
    }
}

fn toggle_pause(keys: Res<ButtonInput<KeyCode>>, mut query: Query<&mut FlockController>) {
    if !keys.just_pressed(KeyCode::Space) {
        return;
    }
    for mut controller in query.iter_mut() {
        controller.paused = !controller.paused;
    }
}
