//! Headless meadow demo: a herd of impostor cows watched by an orbiting viewer.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p meadow-demo -- --count 50 --frames 300`.

use std::process::ExitCode;

use bevy_ecs::prelude::*;
use clap::Parser;
use glam::{Vec2, Vec3};
use meadow_config::{CliArgs, Config, default_config_dir};
use meadow_herd::{
    Backend, Booth, Ground, HerdSpawner, Ledger, SimClock, Transform, Viewer, herd_schedule,
    insert_herd_resources,
};
use meadow_impostor::{FlatGround, HeadlessBackend, MeshData, MeshId, RenderBackend};
use meadow_render::GpuBackend;
use tracing::{error, info, warn};

/// Eye height of the orbiting viewer.
const VIEWER_HEIGHT: f32 = 2.0;

const HIDE: [u8; 4] = [120, 82, 48, 255];
const SPOTS: [u8; 4] = [236, 232, 224, 255];
const HOOF: [u8; 4] = [40, 32, 28, 255];

/// A blocky cow facing +Z: body, head and four legs, standing on y = 0.
fn cow_mesh() -> MeshData {
    let mut cow = MeshData::cuboid_faces(
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.9, 0.8, 1.8),
        [SPOTS, HIDE, HIDE, HIDE, SPOTS, HIDE],
    );
    cow.append(&MeshData::cuboid(
        Vec3::new(0.0, 1.3, 1.1),
        Vec3::new(0.5, 0.5, 0.5),
        SPOTS,
    ));
    for (x, z) in [(-0.3, 0.7), (0.3, 0.7), (-0.3, -0.7), (0.3, -0.7)] {
        cow.append(&MeshData::cuboid(
            Vec3::new(x, 0.3, z),
            Vec3::new(0.2, 0.6, 0.2),
            HOOF,
        ));
    }
    cow
}

fn orbit_position(center: Vec3, radius: f32, angle_deg: f32) -> Vec3 {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    Vec3::new(center.x + sin * radius, VIEWER_HEIGHT, center.z + cos * radius)
}

/// The capture backend plus the cow registered with it.
fn build_backend(use_gpu: bool, config: &Config) -> (Box<dyn RenderBackend + Send + Sync>, MeshId) {
    let mesh = cow_mesh();
    if use_gpu {
        match GpuBackend::new_headless() {
            Ok(mut gpu) => {
                let id = gpu.upload_mesh("Cow", &mesh);
                info!("capturing with the wgpu backend");
                return (Box::new(gpu), id);
            }
            Err(err) => warn!(error = %err, "GPU unavailable, falling back to CPU capture"),
        }
    }
    let mut headless = if config.debug.record_backend_events {
        HeadlessBackend::with_event_log()
    } else {
        HeadlessBackend::new()
    };
    let id = headless.register_mesh(mesh);
    info!("capturing with the headless rasterizer");
    (Box::new(headless), id)
}

fn log_accounting(world: &World, frame: u32) -> bool {
    let stats = world.resource::<Backend>().0.stats();
    let ledger = &world.resource::<Ledger>().0;
    let booth = world.resource::<Booth>().0.stats();
    let consistent = ledger.matches(&stats);
    info!(
        frame,
        live_targets = stats.live_targets,
        target_bytes = stats.target_bytes,
        live_materials = stats.live_materials,
        live_instances = stats.live_instances,
        captures = booth.completed,
        rejected = booth.rejected,
        renders = stats.renders,
        consistent,
        "resource accounting"
    );
    if !consistent {
        warn!(
            expected_targets = ledger.total_targets(),
            expected_bytes = ledger.total_target_bytes(),
            "backend totals diverge from the herd ledger"
        );
    }
    consistent
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    meadow_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));
    if let Err(err) = config.check() {
        warn!(error = %err, "config value will be clamped");
    }

    let (backend, mesh) = build_backend(args.gpu, &config);
    let mut world = World::new();
    insert_herd_resources(&mut world, config.booth.clone(), backend, config.demo.seed);
    world.insert_resource(Ground(Box::new(FlatGround::new(0.0))));

    let zone_center = Vec3::from(config.herd.zone_center);
    let zone_size = Vec2::from(config.herd.zone_size);
    let mut spawner = HerdSpawner::new(config.herd.clone(), mesh);
    spawner.spawn(&mut world, config.herd.count, zone_center, zone_size);

    let radius = config.demo.viewer_orbit_radius;
    let viewer = world
        .spawn((
            Transform::from_position(orbit_position(zone_center, radius, 0.0)),
            Viewer,
        ))
        .id();

    let dt = 1.0 / config.demo.tick_rate.max(1) as f32;
    let interval = config.debug.accounting_interval;
    let mut schedule = herd_schedule();
    let mut consistent = true;
    info!(
        members = spawner.members().len(),
        frames = config.demo.frames,
        tick_rate = config.demo.tick_rate,
        "simulation starting"
    );

    for frame in 1..=config.demo.frames {
        world.resource_mut::<SimClock>().advance(dt);
        let now = world.resource::<SimClock>().now as f32;
        if let Some(mut transform) = world.get_mut::<Transform>(viewer) {
            let angle = now * config.demo.viewer_orbit_speed_deg;
            transform.position = orbit_position(zone_center, radius, angle);
        }
        schedule.run(&mut world);

        if interval > 0 && frame % interval == 0 {
            consistent &= log_accounting(&world, frame);
        }
    }
    consistent &= log_accounting(&world, config.demo.frames);

    let removed = spawner.despawn_all(&mut world);
    let stats = world.resource::<Backend>().0.stats();
    let leaked = stats.live_targets + stats.live_materials + stats.live_instances;
    info!(removed, renders = stats.renders, "herd torn down");

    if leaked > 0 {
        error!(
            live_targets = stats.live_targets,
            live_materials = stats.live_materials,
            live_instances = stats.live_instances,
            "resources leaked after teardown"
        );
        return ExitCode::FAILURE;
    }
    if !consistent {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cow_faces_plus_z() {
        let bounds = cow_mesh().bounds().unwrap();
        assert!(bounds.max.z > -bounds.min.z);
        assert!(bounds.min.y.abs() < 1e-6);
    }

    #[test]
    fn test_orbit_position() {
        let center = Vec3::new(10.0, 0.0, -5.0);
        let north = orbit_position(center, 50.0, 0.0);
        assert!((north - Vec3::new(10.0, VIEWER_HEIGHT, 45.0)).length() < 1e-4);
        let east = orbit_position(center, 50.0, 90.0);
        assert!((east - Vec3::new(60.0, VIEWER_HEIGHT, -5.0)).length() < 1e-4);
    }
}
