use bevy_ecs::prelude::*;
use glam::{Quat, Vec3};
use meadow_impostor::{Billboard, ImpostorEntity, OrientationProbe};

/// World pose of a herd member or viewer.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Transform {
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::from_position(Vec3::ZERO)
    }
}

/// Marks the entity impostors face when no explicit viewer is linked.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewer;

/// Explicit viewer binding; `None` falls back to the single [`Viewer`].
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerLink(pub Option<Entity>);

/// Identity of a herd member.
#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub struct HerdMember {
    pub index: u32,
    pub name: String,
}

/// The impostor standing in for a herd member's mesh.
///
/// `None` when the impostor could not be created; the member still wanders.
#[derive(Component, Debug, Default)]
pub struct ImpostorSlot(pub Option<ImpostorEntity>);

impl ImpostorSlot {
    #[must_use]
    pub fn get(&self) -> Option<&ImpostorEntity> {
        self.0.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut ImpostorEntity> {
        self.0.as_mut()
    }
}

/// Camera-facing quad rotation, updated every frame.
#[derive(Component, Debug, Clone)]
pub struct BillboardFacing {
    pub billboard: Billboard,
    pub rotation: Quat,
}

impl BillboardFacing {
    #[must_use]
    pub fn new(billboard: Billboard) -> Self {
        Self {
            billboard,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Detects a mesh authored facing the wrong way and corrects the capture.
#[derive(Component, Debug, Clone)]
pub struct AutoOrient {
    pub probe: OrientationProbe,
    /// Authored rotation of the mesh relative to its member.
    pub mesh_rotation: Quat,
    pub last_position: Vec3,
    pub applied: bool,
}

impl AutoOrient {
    #[must_use]
    pub fn new(mesh_rotation: Quat, position: Vec3) -> Self {
        Self {
            probe: OrientationProbe::new(),
            mesh_rotation,
            last_position: position,
            applied: false,
        }
    }
}
