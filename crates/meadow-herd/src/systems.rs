//! Per-frame herd systems and their schedule.

use bevy_ecs::prelude::*;
use glam::Vec3;
use meadow_impostor::TickInput;
use tracing::info;

use crate::components::{
    AutoOrient, BillboardFacing, HerdMember, ImpostorSlot, Transform, Viewer, ViewerLink,
};
use crate::resources::{Backend, Booth, CaptureBudget, HerdRng, SimClock};
use crate::wander::Wanderer;

/// Wander, orientation probe, impostor update, billboarding, then booth pump.
pub fn herd_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            wander_system,
            orientation_system,
            impostor_tick_system,
            billboard_system,
            capture_pump_system,
        )
            .chain(),
    );
    schedule
}

pub fn wander_system(
    clock: Res<SimClock>,
    mut rng: ResMut<HerdRng>,
    mut query: Query<(&mut Transform, &mut Wanderer)>,
) {
    for (mut transform, mut wanderer) in &mut query {
        let mut position = transform.position;
        wanderer.update(&mut position, clock.delta, &mut rng.0);
        transform.position = position;
        transform.rotation = wanderer.facing();
    }
}

pub fn orientation_system(
    mut query: Query<(
        &HerdMember,
        &Transform,
        &Wanderer,
        &mut AutoOrient,
        &mut ImpostorSlot,
    )>,
) {
    for (member, transform, wanderer, mut orient, mut slot) in &mut query {
        let movement = transform.position - orient.last_position;
        orient.last_position = transform.position;
        if orient.applied || !wanderer.is_moving() {
            continue;
        }
        let mesh_rotation = transform.rotation * orient.mesh_rotation;
        let Some(offset) = orient.probe.observe(mesh_rotation, movement) else {
            continue;
        };
        orient.applied = true;
        if offset == 0.0 {
            continue;
        }
        // The correction adds to whatever offset is already configured.
        if let Some(impostor) = slot.get_mut() {
            let [x, y, z] = impostor.config().mesh_rotation_offset;
            let yaw = (y + offset).rem_euclid(360.0);
            impostor.set_mesh_rotation_offset(Vec3::new(x, yaw, z));
        }
        info!(member = %member.name, offset, "mesh orientation corrected");
    }
}

/// Position of the viewer a member should face: its linked entity, else
/// the only [`Viewer`] in the world.
fn resolve_viewer(
    link: Option<&ViewerLink>,
    viewers: &Query<&Transform, With<Viewer>>,
    transforms: &Query<&Transform>,
) -> Option<Vec3> {
    match link.and_then(|l| l.0) {
        Some(entity) => transforms.get(entity).ok().map(|t| t.position),
        None => viewers.get_single().ok().map(|t| t.position),
    }
}

pub fn impostor_tick_system(
    clock: Res<SimClock>,
    mut booth: ResMut<Booth>,
    mut backend: ResMut<Backend>,
    viewers: Query<&Transform, With<Viewer>>,
    transforms: Query<&Transform>,
    mut members: Query<(&Transform, &mut ImpostorSlot, Option<&ViewerLink>)>,
) {
    for (transform, mut slot, link) in &mut members {
        let Some(impostor) = slot.get_mut() else {
            continue;
        };
        let input = TickInput {
            now: clock.now,
            position: transform.position,
            viewer: resolve_viewer(link, &viewers, &transforms),
            parent_rotation: Some(transform.rotation),
        };
        impostor.tick(&input, &mut booth.0, backend.0.as_mut());
    }
}

pub fn billboard_system(
    clock: Res<SimClock>,
    viewers: Query<&Transform, With<Viewer>>,
    transforms: Query<&Transform>,
    mut quads: Query<(&Transform, &mut BillboardFacing, Option<&ViewerLink>)>,
) {
    for (transform, mut facing, link) in &mut quads {
        let Some(camera) = resolve_viewer(link, &viewers, &transforms) else {
            continue;
        };
        let rotation = facing
            .billboard
            .face(transform.position, camera, clock.delta);
        facing.rotation = rotation;
    }
}

pub fn capture_pump_system(
    mut booth: ResMut<Booth>,
    mut backend: ResMut<Backend>,
    budget: Res<CaptureBudget>,
) {
    if booth.0.pending() > 0 {
        booth.0.pump(backend.0.as_mut(), budget.0);
    }
}
