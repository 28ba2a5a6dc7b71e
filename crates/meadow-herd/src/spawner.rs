//! Spawning and despawning herd members with their impostors.

use bevy_ecs::prelude::*;
use glam::{EulerRot, Quat, Vec2, Vec3};
use meadow_config::HerdConfig;
use meadow_impostor::{
    Billboard, ImpostorEntity, ImpostorFootprint, ImpostorSource, MaterialId, MeshId,
    snap_to_ground,
};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::components::{
    AutoOrient, BillboardFacing, HerdMember, ImpostorSlot, Transform, ViewerLink,
};
use crate::resources::{Backend, Booth, Ground, HerdRng, Ledger, SimClock};
use crate::wander::Wanderer;

/// A spawned herd member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HerdHandle(Entity);

impl HerdHandle {
    #[must_use]
    pub fn entity(self) -> Entity {
        self.0
    }

    /// The member's wander AI, or `None` once despawned.
    pub fn wanderer_mut(self, world: &mut World) -> Option<Mut<'_, Wanderer>> {
        world.get_mut::<Wanderer>(self.0)
    }

    /// The member's impostor slot, or `None` once despawned.
    pub fn impostor_mut(self, world: &mut World) -> Option<Mut<'_, ImpostorSlot>> {
        world.get_mut::<ImpostorSlot>(self.0)
    }

    /// Bind the member to a specific viewer instead of the world's [`Viewer`](crate::Viewer).
    pub fn link_viewer(self, world: &mut World, viewer: Option<Entity>) -> bool {
        match world.get_mut::<ViewerLink>(self.0) {
            Some(mut link) => {
                link.0 = viewer;
                true
            }
            None => false,
        }
    }
}

/// Creates herd members sharing one source mesh.
#[derive(Debug)]
pub struct HerdSpawner {
    config: HerdConfig,
    mesh: MeshId,
    material_template: Option<MaterialId>,
    mesh_rest_rotation: Quat,
    members: Vec<Entity>,
    next_index: u32,
}

impl HerdSpawner {
    #[must_use]
    pub fn new(config: HerdConfig, mesh: MeshId) -> Self {
        Self {
            config,
            mesh,
            material_template: None,
            mesh_rest_rotation: Quat::IDENTITY,
            members: Vec::new(),
            next_index: 1,
        }
    }

    #[must_use]
    pub fn with_material_template(mut self, material: MaterialId) -> Self {
        self.material_template = Some(material);
        self
    }

    /// Rotation of the source mesh relative to the member, as authored.
    /// Seeds orientation detection when `auto_detect_orientation` is set.
    #[must_use]
    pub fn with_mesh_rest_rotation(mut self, rotation: Quat) -> Self {
        self.mesh_rest_rotation = rotation;
        self
    }

    #[must_use]
    pub fn config(&self) -> &HerdConfig {
        &self.config
    }

    #[must_use]
    pub fn members(&self) -> &[Entity] {
        &self.members
    }

    /// Spawn `count` members at random points of the zone.
    ///
    /// A member whose impostor fails to build is still spawned with an
    /// empty [`ImpostorSlot`].
    pub fn spawn(
        &mut self,
        world: &mut World,
        count: u32,
        zone_center: Vec3,
        zone_size: Vec2,
    ) -> Vec<HerdHandle> {
        let zone_size = zone_size.abs();
        let mut handles = Vec::with_capacity(count as usize);
        for _ in 0..count {
            handles.push(self.spawn_one(world, zone_center, zone_size));
        }
        info!(
            spawned = handles.len(),
            live = self.members.len(),
            "herd spawned"
        );
        handles
    }

    fn spawn_one(&mut self, world: &mut World, zone_center: Vec3, zone_size: Vec2) -> HerdHandle {
        let index = self.next_index;
        self.next_index += 1;
        let name = format!("{}_{index}", self.config.name_prefix);

        let (position, yaw) = {
            let mut rng = world.resource_mut::<HerdRng>();
            let half = zone_size * 0.5;
            let offset = Vec3::new(
                rng.0.gen_range(-half.x..=half.x),
                0.0,
                rng.0.gen_range(-half.y..=half.y),
            );
            (zone_center + offset, rng.0.gen_range(0.0..360.0_f32))
        };
        let position = match world.get_resource::<Ground>() {
            Some(ground) => snap_to_ground(ground.0.as_ref(), position, &self.config.template),
            None => position,
        };

        let now = world.get_resource::<SimClock>().map_or(0.0, |c| c.now);
        let source = ImpostorSource {
            name: &name,
            mesh: Some(self.mesh),
            material_template: self.material_template,
        };
        let template = &self.config.template;
        let built = world.resource_scope(|world, mut booth: Mut<Booth>| {
            let size = booth.0.settings().render_target_size;
            let mut backend = world.resource_mut::<Backend>();
            ImpostorEntity::spawn(source, template, &mut booth.0, backend.0.as_mut(), now)
                .map(|impostor| (impostor, size))
        });
        let (slot, footprint) = match built {
            Ok((impostor, size)) => {
                let footprint = ImpostorFootprint::for_entity(size, impostor.config().use_parallax);
                (ImpostorSlot(Some(impostor)), Some(footprint))
            }
            Err(err) => {
                warn!(member = %name, error = %err, "impostor unavailable");
                (ImpostorSlot(None), None)
            }
        };

        let rotation = Quat::from_rotation_y(yaw.to_radians());
        let mut entity = world.spawn((
            Transform { position, rotation },
            Wanderer::new(&self.config, zone_center, zone_size, yaw),
            slot,
            BillboardFacing::new(Billboard::new(self.config.billboard.clone())),
            HerdMember {
                index,
                name: name.clone(),
            },
            ViewerLink(None),
        ));
        if self.config.auto_detect_orientation {
            let [x, y, z] = self.config.template.mesh_rotation_offset;
            let configured =
                Quat::from_euler(EulerRot::YXZ, y.to_radians(), x.to_radians(), z.to_radians());
            entity.insert(AutoOrient::new(self.mesh_rest_rotation * configured, position));
        }
        let id = entity.id();

        if let Some(footprint) = footprint {
            world.resource_mut::<Ledger>().0.on_spawned(id.to_bits(), footprint);
        }
        self.members.push(id);
        debug!(member = %name, ?position, "herd member spawned");
        HerdHandle(id)
    }

    /// Destroy the member's impostor and remove it from the world.
    ///
    /// Returns `false` when the handle no longer refers to a member.
    pub fn despawn(&mut self, world: &mut World, handle: HerdHandle) -> bool {
        let entity = handle.entity();
        if world.get::<HerdMember>(entity).is_none() {
            return false;
        }
        let slot = world.entity_mut(entity).take::<ImpostorSlot>();
        if let Some(impostor) = slot.and_then(|s| s.0) {
            world.resource_scope(|world, mut booth: Mut<Booth>| {
                let mut backend = world.resource_mut::<Backend>();
                impostor.destroy(&mut booth.0, backend.0.as_mut());
            });
        }
        world.resource_mut::<Ledger>().0.on_destroyed(entity.to_bits());
        world.despawn(entity);
        self.members.retain(|&e| e != entity);
        true
    }

    /// Despawn every member this spawner created; returns how many were removed.
    pub fn despawn_all(&mut self, world: &mut World) -> usize {
        let members = std::mem::take(&mut self.members);
        let removed = members
            .into_iter()
            .filter(|&e| self.despawn(world, HerdHandle(e)))
            .count();
        info!(removed, "herd despawned");
        removed
    }
}
