//! Deterministic CPU implementation of [`RenderBackend`].
//!
//! Used by tests and the headless demo. Render targets are plain pixel
//! buffers, meshes are drawn by the software rasterizer in `raster`, and
//! every resource is accounted exactly like a GPU backend would. An
//! optional event log records backend calls in order so capture sequencing
//! can be asserted.

use rustc_hash::FxHashMap;

use crate::backend::{
    BackendStats, CaptureCamera, InstanceId, MaterialId, MeshId, Placement, RenderBackend,
    RenderTargetDesc, TargetId, TargetKind,
};
use crate::bounds::Aabb;
use crate::error::BackendError;
use crate::material::{FloatParam, ShaderVariant, TextureSlot};
use crate::mesh::MeshData;
use crate::raster::{Canvas, to_rgba8};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    TargetCreated { target: TargetId, label: String },
    TargetReleased(TargetId),
    InstanceCreated(InstanceId),
    InstanceDestroyed(InstanceId),
    InstanceActive { instance: InstanceId, active: bool },
    InstancePlaced { instance: InstanceId, placement: Placement },
    InstanceLayer { instance: InstanceId, layer: u32 },
    MaterialCreated(MaterialId),
    MaterialDestroyed(MaterialId),
    Render { color: TargetId, depth: Option<TargetId>, drawn: usize },
}

enum Pixels {
    Color(Vec<[u8; 4]>),
    Depth(Vec<f32>),
}

struct Target {
    desc: RenderTargetDesc,
    pixels: Pixels,
}

struct Instance {
    mesh: MeshId,
    label: String,
    placement: Placement,
    layer: u32,
    active: bool,
}

#[derive(Clone)]
struct Material {
    variant: ShaderVariant,
    textures: [Option<TargetId>; 4],
    floats: [f32; 4],
}

/// Software render backend.
#[derive(Default)]
pub struct HeadlessBackend {
    next_id: u64,
    meshes: FxHashMap<MeshId, MeshData>,
    instances: FxHashMap<InstanceId, Instance>,
    targets: FxHashMap<TargetId, Target>,
    materials: FxHashMap<MaterialId, Material>,
    target_bytes: u64,
    renders: u64,
    /// Maximum number of live targets; allocation beyond fails.
    target_limit: Option<usize>,
    events: Option<Vec<BackendEvent>>,
}

impl HeadlessBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that records every call in [`events`](Self::events).
    #[must_use]
    pub fn with_event_log() -> Self {
        Self {
            events: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Fail target allocations once `limit` targets are live.
    #[must_use]
    pub fn with_target_limit(mut self, limit: usize) -> Self {
        self.target_limit = Some(limit);
        self
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, event: BackendEvent) {
        if let Some(events) = self.events.as_mut() {
            events.push(event);
        }
    }

    /// Registers a mesh asset that instances can be created from.
    pub fn register_mesh(&mut self, mesh: MeshData) -> MeshId {
        let id = MeshId(self.alloc_id());
        self.meshes.insert(id, mesh);
        id
    }

    /// Recorded calls, empty unless built with [`with_event_log`](Self::with_event_log).
    #[must_use]
    pub fn events(&self) -> &[BackendEvent] {
        self.events.as_deref().unwrap_or(&[])
    }

    pub fn clear_events(&mut self) {
        if let Some(events) = self.events.as_mut() {
            events.clear();
        }
    }

    /// Row-major RGBA pixels of a color target.
    #[must_use]
    pub fn target_pixels(&self, target: TargetId) -> Option<&[[u8; 4]]> {
        match &self.targets.get(&target)?.pixels {
            Pixels::Color(px) => Some(px),
            Pixels::Depth(_) => None,
        }
    }

    /// Row-major depth of a depth target.
    #[must_use]
    pub fn target_depth(&self, target: TargetId) -> Option<&[f32]> {
        match &self.targets.get(&target)?.pixels {
            Pixels::Depth(d) => Some(d),
            Pixels::Color(_) => None,
        }
    }

    #[must_use]
    pub fn target_label(&self, target: TargetId) -> Option<&str> {
        self.targets.get(&target).map(|t| t.desc.label.as_str())
    }

    #[must_use]
    pub fn instance_label(&self, instance: InstanceId) -> Option<&str> {
        self.instances.get(&instance).map(|i| i.label.as_str())
    }

    #[must_use]
    pub fn material_variant(&self, material: MaterialId) -> Option<ShaderVariant> {
        self.materials.get(&material).map(|m| m.variant)
    }

    #[must_use]
    pub fn material_texture(&self, material: MaterialId, slot: TextureSlot) -> Option<TargetId> {
        self.materials.get(&material)?.textures[slot.index()]
    }

    #[must_use]
    pub fn material_float(&self, material: MaterialId, param: FloatParam) -> Option<f32> {
        self.materials.get(&material).map(|m| m.floats[param.index()])
    }

    fn instance_mut(&mut self, instance: InstanceId) -> Result<&mut Instance, BackendError> {
        self.instances
            .get_mut(&instance)
            .ok_or(BackendError::UnknownInstance(instance))
    }

    fn target_of_kind(&self, target: TargetId, kind: TargetKind) -> Result<&Target, BackendError> {
        let t = self
            .targets
            .get(&target)
            .ok_or(BackendError::UnknownTarget(target))?;
        if t.desc.kind != kind {
            return Err(BackendError::WrongTargetKind {
                target,
                expected: kind,
            });
        }
        Ok(t)
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<TargetId, BackendError> {
        if desc.size == 0 {
            return Err(BackendError::InvalidTargetSize(desc.size));
        }
        if let Some(limit) = self.target_limit
            && self.targets.len() >= limit
        {
            return Err(BackendError::Device(format!(
                "target limit of {limit} reached"
            )));
        }
        let texels = (desc.size as usize) * (desc.size as usize);
        let pixels = match desc.kind {
            TargetKind::Color => Pixels::Color(vec![[0; 4]; texels]),
            TargetKind::Depth => Pixels::Depth(vec![1.0; texels]),
        };
        let id = TargetId(self.alloc_id());
        self.target_bytes += desc.byte_size();
        self.targets.insert(
            id,
            Target {
                desc: desc.clone(),
                pixels,
            },
        );
        self.record(BackendEvent::TargetCreated {
            target: id,
            label: desc.label.clone(),
        });
        Ok(id)
    }

    fn release_render_target(&mut self, target: TargetId) -> bool {
        match self.targets.remove(&target) {
            Some(t) => {
                self.target_bytes -= t.desc.byte_size();
                self.record(BackendEvent::TargetReleased(target));
                true
            }
            None => {
                tracing::warn!(%target, "release of unknown render target");
                false
            }
        }
    }

    fn instantiate_mesh(&mut self, mesh: MeshId, label: &str) -> Result<InstanceId, BackendError> {
        if !self.meshes.contains_key(&mesh) {
            return Err(BackendError::UnknownMesh(mesh));
        }
        let id = InstanceId(self.alloc_id());
        self.instances.insert(
            id,
            Instance {
                mesh,
                label: label.to_string(),
                placement: Placement::IDENTITY,
                layer: 0,
                active: true,
            },
        );
        self.record(BackendEvent::InstanceCreated(id));
        Ok(id)
    }

    fn destroy_instance(&mut self, instance: InstanceId) -> bool {
        if self.instances.remove(&instance).is_some() {
            self.record(BackendEvent::InstanceDestroyed(instance));
            true
        } else {
            false
        }
    }

    fn set_instance_active(
        &mut self,
        instance: InstanceId,
        active: bool,
    ) -> Result<(), BackendError> {
        self.instance_mut(instance)?.active = active;
        self.record(BackendEvent::InstanceActive { instance, active });
        Ok(())
    }

    fn instance_active(&self, instance: InstanceId) -> Option<bool> {
        self.instances.get(&instance).map(|i| i.active)
    }

    fn instance_placement(&self, instance: InstanceId) -> Option<Placement> {
        self.instances.get(&instance).map(|i| i.placement)
    }

    fn set_instance_placement(
        &mut self,
        instance: InstanceId,
        placement: Placement,
    ) -> Result<(), BackendError> {
        self.instance_mut(instance)?.placement = placement;
        self.record(BackendEvent::InstancePlaced {
            instance,
            placement,
        });
        Ok(())
    }

    fn instance_layer(&self, instance: InstanceId) -> Option<u32> {
        self.instances.get(&instance).map(|i| i.layer)
    }

    fn set_instance_layer(&mut self, instance: InstanceId, layer: u32) -> Result<(), BackendError> {
        self.instance_mut(instance)?.layer = layer;
        self.record(BackendEvent::InstanceLayer { instance, layer });
        Ok(())
    }

    fn instance_bounds(&self, instance: InstanceId) -> Option<Aabb> {
        let inst = self.instances.get(&instance)?;
        let local = self.meshes.get(&inst.mesh)?.bounds()?;
        Some(local.transformed(&inst.placement.matrix()))
    }

    fn create_material(
        &mut self,
        variant: ShaderVariant,
        template: Option<MaterialId>,
    ) -> Result<MaterialId, BackendError> {
        let material = match template {
            Some(t) => {
                let mut copy = self
                    .materials
                    .get(&t)
                    .cloned()
                    .ok_or(BackendError::UnknownMaterial(t))?;
                copy.variant = variant;
                copy
            }
            None => Material {
                variant,
                textures: [None; 4],
                floats: FloatParam::ALL.map(FloatParam::default_value),
            },
        };
        let id = MaterialId(self.alloc_id());
        self.materials.insert(id, material);
        self.record(BackendEvent::MaterialCreated(id));
        Ok(id)
    }

    fn destroy_material(&mut self, material: MaterialId) -> bool {
        if self.materials.remove(&material).is_some() {
            self.record(BackendEvent::MaterialDestroyed(material));
            true
        } else {
            false
        }
    }

    fn set_material_texture(
        &mut self,
        material: MaterialId,
        slot: TextureSlot,
        target: TargetId,
    ) -> Result<(), BackendError> {
        let kind = if slot.is_depth() {
            TargetKind::Depth
        } else {
            TargetKind::Color
        };
        self.target_of_kind(target, kind)?;
        let m = self
            .materials
            .get_mut(&material)
            .ok_or(BackendError::UnknownMaterial(material))?;
        m.textures[slot.index()] = Some(target);
        Ok(())
    }

    fn set_material_float(
        &mut self,
        material: MaterialId,
        param: FloatParam,
        value: f32,
    ) -> Result<(), BackendError> {
        let m = self
            .materials
            .get_mut(&material)
            .ok_or(BackendError::UnknownMaterial(material))?;
        m.floats[param.index()] = value;
        Ok(())
    }

    fn render(
        &mut self,
        camera: &CaptureCamera,
        color: TargetId,
        depth: Option<TargetId>,
    ) -> Result<(), BackendError> {
        let size = self.target_of_kind(color, TargetKind::Color)?.desc.size;
        if let Some(d) = depth {
            let depth_size = self.target_of_kind(d, TargetKind::Depth)?.desc.size;
            if depth_size != size {
                return Err(BackendError::SizeMismatch {
                    color: size,
                    depth: depth_size,
                });
            }
        }

        let mut drawable: Vec<(InstanceId, MeshId, Placement)> = self
            .instances
            .iter()
            .filter(|(_, i)| i.active && camera.sees_layer(i.layer))
            .map(|(id, i)| (*id, i.mesh, i.placement))
            .collect();
        drawable.sort_by_key(|(id, _, _)| *id);

        let texels = (size as usize) * (size as usize);
        let mut pixels = vec![to_rgba8(camera.clear_color); texels];
        let mut zbuf = vec![f32::INFINITY; texels];
        let view_proj = camera.view_projection();
        {
            let mut canvas = Canvas {
                size,
                color: &mut pixels,
                zbuf: &mut zbuf,
            };
            for (_, mesh, placement) in &drawable {
                if let Some(data) = self.meshes.get(mesh) {
                    canvas.draw(&(view_proj * placement.matrix()), data);
                }
            }
        }

        if let Some(t) = self.targets.get_mut(&color) {
            t.pixels = Pixels::Color(pixels);
        }
        if let Some(d) = depth
            && let Some(t) = self.targets.get_mut(&d)
        {
            t.pixels = Pixels::Depth(zbuf.iter().map(|z| z.min(1.0)).collect());
        }
        self.renders += 1;
        self.record(BackendEvent::Render {
            color,
            depth,
            drawn: drawable.len(),
        });
        Ok(())
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            live_targets: self.targets.len(),
            live_materials: self.materials.len(),
            live_instances: self.instances.len(),
            target_bytes: self.target_bytes,
            renders: self.renders,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::backend::{Projection, layer_mask};

    fn front_camera(mask: u32) -> CaptureCamera {
        CaptureCamera {
            position: Vec3::new(0.0, 0.5, 4.0),
            target: Vec3::new(0.0, 0.5, 0.0),
            up: Vec3::Y,
            projection: Projection::Perspective { fov_y_deg: 60.0 },
            near: 0.3,
            far: 100.0,
            layer_mask: mask,
            clear_color: [0.0, 0.0, 1.0, 0.0],
        }
    }

    fn red_box() -> MeshData {
        MeshData::cuboid(Vec3::new(0.0, 0.5, 0.0), Vec3::ONE, [255, 0, 0, 255])
    }

    #[test]
    fn test_render_draws_masked_layer_only() {
        let mut backend = HeadlessBackend::new();
        let mesh = backend.register_mesh(red_box());
        let instance = backend.instantiate_mesh(mesh, "box").unwrap();
        let target = backend
            .create_render_target(&RenderTargetDesc::color("t", 16))
            .unwrap();

        backend.render(&front_camera(layer_mask(7)), target, None).unwrap();
        let px = backend.target_pixels(target).unwrap();
        assert_eq!(px[8 * 16 + 8], [0, 0, 255, 0], "layer 0 must be culled");

        backend.set_instance_layer(instance, 7).unwrap();
        backend.render(&front_camera(layer_mask(7)), target, None).unwrap();
        let px = backend.target_pixels(target).unwrap();
        assert_eq!(px[8 * 16 + 8], [255, 0, 0, 255]);
        assert_eq!(px[0], [0, 0, 255, 0], "background stays transparent");
    }

    #[test]
    fn test_inactive_instance_not_drawn() {
        let mut backend = HeadlessBackend::new();
        let mesh = backend.register_mesh(red_box());
        let instance = backend.instantiate_mesh(mesh, "box").unwrap();
        backend.set_instance_active(instance, false).unwrap();
        let target = backend
            .create_render_target(&RenderTargetDesc::color("t", 8))
            .unwrap();
        backend.render(&front_camera(1), target, None).unwrap();
        assert!(backend.target_pixels(target).unwrap().iter().all(|p| p[3] == 0));
    }

    #[test]
    fn test_depth_target_written() {
        let mut backend = HeadlessBackend::new();
        let mesh = backend.register_mesh(red_box());
        backend.instantiate_mesh(mesh, "box").unwrap();
        let color = backend
            .create_render_target(&RenderTargetDesc::color("c", 16))
            .unwrap();
        let depth = backend
            .create_render_target(&RenderTargetDesc::depth("d", 16))
            .unwrap();
        backend.render(&front_camera(1), color, Some(depth)).unwrap();
        let d = backend.target_depth(depth).unwrap();
        assert!(d[8 * 16 + 8] < 1.0);
        assert_eq!(d[0], 1.0);
    }

    #[test]
    fn test_render_rejects_mismatched_targets() {
        let mut backend = HeadlessBackend::new();
        let color = backend
            .create_render_target(&RenderTargetDesc::color("c", 16))
            .unwrap();
        let small = backend
            .create_render_target(&RenderTargetDesc::depth("d", 8))
            .unwrap();
        assert_eq!(
            backend.render(&front_camera(1), color, Some(small)),
            Err(BackendError::SizeMismatch { color: 16, depth: 8 })
        );
        assert!(matches!(
            backend.render(&front_camera(1), small, None),
            Err(BackendError::WrongTargetKind { .. })
        ));
    }

    #[test]
    fn test_accounting_tracks_live_resources() {
        let mut backend = HeadlessBackend::new();
        let a = backend
            .create_render_target(&RenderTargetDesc::color("a", 4))
            .unwrap();
        let b = backend
            .create_render_target(&RenderTargetDesc::depth("b", 4))
            .unwrap();
        let m = backend.create_material(ShaderVariant::Clean, None).unwrap();
        assert_eq!(backend.stats().live_targets, 2);
        assert_eq!(backend.stats().target_bytes, 4 * 4 * 4 + 4 * 4 * 2);

        assert!(backend.release_render_target(a));
        assert!(!backend.release_render_target(a));
        assert!(backend.release_render_target(b));
        assert!(backend.destroy_material(m));
        assert_eq!(backend.stats(), BackendStats::default());
    }

    #[test]
    fn test_material_template_is_copied() {
        let mut backend = HeadlessBackend::new();
        let template = backend.create_material(ShaderVariant::Clean, None).unwrap();
        backend
            .set_material_float(template, FloatParam::ParallaxStrength, 0.07)
            .unwrap();
        let copy = backend
            .create_material(ShaderVariant::Parallax, Some(template))
            .unwrap();
        assert_ne!(copy, template);
        assert_eq!(backend.material_float(copy, FloatParam::ParallaxStrength), Some(0.07));
        assert_eq!(backend.material_variant(copy), Some(ShaderVariant::Parallax));

        backend
            .set_material_float(copy, FloatParam::BlendAmount, 0.5)
            .unwrap();
        assert_eq!(backend.material_float(template, FloatParam::BlendAmount), Some(0.0));
    }

    #[test]
    fn test_depth_slot_rejects_color_target() {
        let mut backend = HeadlessBackend::new();
        let material = backend.create_material(ShaderVariant::Parallax, None).unwrap();
        let color = backend
            .create_render_target(&RenderTargetDesc::color("c", 4))
            .unwrap();
        assert!(
            backend
                .set_material_texture(material, TextureSlot::MainDepth, color)
                .is_err()
        );
        backend
            .set_material_texture(material, TextureSlot::Main, color)
            .unwrap();
        assert_eq!(backend.material_texture(material, TextureSlot::Main), Some(color));
    }

    #[test]
    fn test_target_limit() {
        let mut backend = HeadlessBackend::new().with_target_limit(1);
        backend
            .create_render_target(&RenderTargetDesc::color("a", 4))
            .unwrap();
        assert!(matches!(
            backend.create_render_target(&RenderTargetDesc::color("b", 4)),
            Err(BackendError::Device(_))
        ));
    }
}
