//! The seam between impostor logic and the platform renderer.
//!
//! Everything the core needs from a renderer (render targets, mesh
//! instances with a transform and a render layer, material instances with
//! named bindings, and "render this camera into that target") goes
//! through [`RenderBackend`]. Resources are referred to by opaque `u64`
//! newtype handles so ownership stays with whoever created them.

use std::fmt;

use glam::{Mat4, Quat, Vec3};

use crate::bounds::Aabb;
use crate::error::BackendError;
use crate::material::{FloatParam, ShaderVariant, TextureSlot};

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// A mesh asset registered with the backend.
    MeshId,
    "mesh"
);
handle!(
    /// A placed copy of a mesh with its own transform, layer and visibility.
    InstanceId,
    "instance"
);
handle!(
    /// A 2D render target.
    TargetId,
    "target"
);
handle!(
    /// A material instance.
    MaterialId,
    "material"
);

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// What a render target stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// RGBA8, sRGB-agnostic, alpha preserved.
    Color,
    /// Single-channel 16-bit float depth in `[0, 1]`, 1 at the far plane.
    Depth,
}

impl TargetKind {
    #[must_use]
    pub const fn bytes_per_texel(self) -> u64 {
        match self {
            TargetKind::Color => 4,
            TargetKind::Depth => 2,
        }
    }
}

/// Parameters for [`RenderBackend::create_render_target`].
///
/// Targets are always square, bilinear filtered and clamped at the edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub label: String,
    pub size: u32,
    pub kind: TargetKind,
}

impl RenderTargetDesc {
    pub fn color(label: impl Into<String>, size: u32) -> Self {
        Self {
            label: label.into(),
            size,
            kind: TargetKind::Color,
        }
    }

    pub fn depth(label: impl Into<String>, size: u32) -> Self {
        Self {
            label: label.into(),
            size,
            kind: TargetKind::Depth,
        }
    }

    /// GPU memory this target occupies.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        u64::from(self.size) * u64::from(self.size) * self.kind.bytes_per_texel()
    }
}

/// Position and orientation of a mesh instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Placement {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    #[must_use]
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Model matrix.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

/// Projection used for one capture render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Vertical field of view in degrees; aspect is always 1.
    Perspective { fov_y_deg: f32 },
    /// Half the visible width/height in world units.
    Orthographic { half_extent: f32 },
}

/// A fully resolved capture camera pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
    /// Bit `n` set renders instances on layer `n`.
    pub layer_mask: u32,
    /// RGBA clear color.
    pub clear_color: [f32; 4],
}

impl CaptureCamera {
    #[must_use]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Right-handed projection with depth in `[0, 1]`.
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov_y_deg } => {
                Mat4::perspective_rh(fov_y_deg.to_radians(), 1.0, self.near, self.far)
            }
            Projection::Orthographic { half_extent } => Mat4::orthographic_rh(
                -half_extent,
                half_extent,
                -half_extent,
                half_extent,
                self.near,
                self.far,
            ),
        }
    }

    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view()
    }

    /// Whether an instance on `layer` is visible to this camera.
    #[must_use]
    pub fn sees_layer(&self, layer: u32) -> bool {
        layer < 32 && self.layer_mask & (1 << layer) != 0
    }
}

/// Mask containing only `layer`.
#[must_use]
pub fn layer_mask(layer: u32) -> u32 {
    1u32.checked_shl(layer).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

/// Live resource counts reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub live_targets: usize,
    pub live_materials: usize,
    pub live_instances: usize,
    /// Bytes held by live render targets.
    pub target_bytes: u64,
    /// Render calls served since creation.
    pub renders: u64,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Renderer services used by the capture booth and impostor entities.
///
/// Releasing or destroying an unknown handle is a no-op that returns
/// `false`; every other call on an unknown handle returns an error.
pub trait RenderBackend {
    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<TargetId, BackendError>;

    fn release_render_target(&mut self, target: TargetId) -> bool;

    /// Places a new copy of `mesh` at the origin on layer 0, active.
    fn instantiate_mesh(&mut self, mesh: MeshId, label: &str) -> Result<InstanceId, BackendError>;

    fn destroy_instance(&mut self, instance: InstanceId) -> bool;

    fn set_instance_active(&mut self, instance: InstanceId, active: bool)
    -> Result<(), BackendError>;

    fn instance_active(&self, instance: InstanceId) -> Option<bool>;

    fn instance_placement(&self, instance: InstanceId) -> Option<Placement>;

    fn set_instance_placement(
        &mut self,
        instance: InstanceId,
        placement: Placement,
    ) -> Result<(), BackendError>;

    fn instance_layer(&self, instance: InstanceId) -> Option<u32>;

    fn set_instance_layer(&mut self, instance: InstanceId, layer: u32) -> Result<(), BackendError>;

    /// World-space bounds of an instance at its current placement.
    fn instance_bounds(&self, instance: InstanceId) -> Option<Aabb>;

    /// Creates a private material. With a template, its bindings and
    /// parameters are copied; the template itself is never shared.
    fn create_material(
        &mut self,
        variant: ShaderVariant,
        template: Option<MaterialId>,
    ) -> Result<MaterialId, BackendError>;

    fn destroy_material(&mut self, material: MaterialId) -> bool;

    fn set_material_texture(
        &mut self,
        material: MaterialId,
        slot: TextureSlot,
        target: TargetId,
    ) -> Result<(), BackendError>;

    fn set_material_float(
        &mut self,
        material: MaterialId,
        param: FloatParam,
        value: f32,
    ) -> Result<(), BackendError>;

    /// Clears `color` (and `depth`) and draws every active instance the
    /// camera's layer mask admits.
    fn render(
        &mut self,
        camera: &CaptureCamera,
        color: TargetId,
        depth: Option<TargetId>,
    ) -> Result<(), BackendError>;

    fn stats(&self) -> BackendStats;
}
