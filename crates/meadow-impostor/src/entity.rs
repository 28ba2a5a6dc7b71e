//! Per-instance impostor state machine.
//!
//! An [`ImpostorEntity`] owns a hidden clone of the source mesh, a
//! complete [`RenderTargetSet`] and a private material. Every tick it picks
//! the octant texture(s) matching the viewer's bearing; on its capture
//! deadline it asks the booth to refresh all eight snapshots.
//!
//! Teardown is explicit: [`ImpostorEntity::destroy`] consumes the entity and
//! releases exactly the resources it created. Dropping a live entity
//! without calling it logs a leak warning.

use glam::{EulerRot, Quat, Vec2, Vec3};
use meadow_config::ImpostorConfig;
use meadow_octant::{
    BearingConvention, Octant, OctantBlend, forward_of, octant_blend, octant_blend_rotating,
};
use tracing::{debug, error, warn};

use crate::backend::{InstanceId, MaterialId, MeshId, Placement, RenderBackend};
use crate::booth::{CameraOverrides, CaptureBooth, CaptureRequest, CaptureTicket};
use crate::bounds::{ColliderBox, collider_box, quad_scale};
use crate::error::ImpostorError;
use crate::material::{FloatParam, ShaderVariant, TextureSlot, parallax_params};
use crate::targets::RenderTargetSet;

/// What to build an impostor from.
#[derive(Debug, Clone, Copy)]
pub struct ImpostorSource<'a> {
    /// Unique name; render targets are labelled `{name}_{Compass}`.
    pub name: &'a str,
    pub mesh: Option<MeshId>,
    /// Material whose bindings seed the private copy.
    pub material_template: Option<MaterialId>,
}

/// Live inputs for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    /// Simulation time in seconds.
    pub now: f64,
    /// World position of the impostor quad.
    pub position: Vec3,
    /// Viewer position, if one is bound.
    pub viewer: Option<Vec3>,
    /// Rotation of the parent the impostor is attached to, if any.
    pub parent_rotation: Option<Quat>,
}

/// Octant textures currently bound to the material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayedView {
    pub primary: Octant,
    /// Bound only while blending.
    pub secondary: Option<Octant>,
    pub blend: f32,
}

impl DisplayedView {
    fn single(octant: Octant) -> Self {
        Self {
            primary: octant,
            secondary: None,
            blend: 0.0,
        }
    }
}

/// Snapshot of an entity's internal state for tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpostorDebugInfo {
    pub name: String,
    pub alive: bool,
    pub animated: bool,
    pub parallax: bool,
    pub displayed: Option<DisplayedView>,
    pub next_capture_at: f64,
    pub captures_requested: u64,
    pub captures_rejected: u64,
    pub last_ticket: Option<CaptureTicket>,
    pub target_count: usize,
}

/// What [`ImpostorEntity::destroy`] released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub targets_released: usize,
    pub material_released: bool,
    pub instance_destroyed: bool,
    pub captures_discarded: usize,
}

#[derive(Debug)]
struct Owned {
    instance: InstanceId,
    targets: RenderTargetSet,
    material: MaterialId,
}

/// A flat quad standing in for a 3D mesh.
#[derive(Debug)]
pub struct ImpostorEntity {
    name: String,
    config: ImpostorConfig,
    owned: Option<Owned>,
    next_capture_at: f64,
    displayed: Option<DisplayedView>,
    quad_scale: Vec2,
    collider: Option<ColliderBox>,
    captures_requested: u64,
    captures_rejected: u64,
    last_ticket: Option<CaptureTicket>,
}

impl ImpostorEntity {
    /// Clones the mesh off-world, allocates targets and material, and
    /// performs the first capture.
    ///
    /// Fails with [`ImpostorError::MissingMeshSource`] when no mesh is set.
    /// On any failure nothing stays allocated.
    pub fn spawn(
        source: ImpostorSource<'_>,
        config: &ImpostorConfig,
        booth: &mut CaptureBooth,
        backend: &mut dyn RenderBackend,
        now: f64,
    ) -> Result<Self, ImpostorError> {
        let name = source.name;
        let config = config.validated();
        let Some(mesh) = source.mesh else {
            error!(entity = name, "no mesh source configured; impostor disabled");
            return Err(ImpostorError::MissingMeshSource {
                entity: name.to_string(),
            });
        };

        let instance = backend.instantiate_mesh(mesh, &format!("{name}_Clone"))?;
        let parked = backend
            .set_instance_placement(instance, Placement::at(booth.park_position()))
            .and_then(|()| backend.set_instance_active(instance, false));
        if let Err(err) = parked {
            backend.destroy_instance(instance);
            return Err(err.into());
        }

        let targets = match booth.create_render_target_set(backend, name, config.use_parallax) {
            Ok(t) => t,
            Err(err) => {
                backend.destroy_instance(instance);
                return Err(err);
            }
        };

        let material = match build_material(backend, &config, &targets, source.material_template) {
            Ok(m) => m,
            Err(err) => {
                targets.release(backend);
                backend.destroy_instance(instance);
                return Err(err);
            }
        };

        // Bounds at the parking spot, before any capture rotation.
        let bounds = backend.instance_bounds(instance);
        let quad = quad_scale(&config, bounds.as_ref());
        let collider = collider_box(&config, quad);

        let mut entity = Self {
            name: name.to_string(),
            config,
            owned: Some(Owned {
                instance,
                targets,
                material,
            }),
            next_capture_at: now,
            displayed: Some(DisplayedView::single(Octant::North)),
            quad_scale: quad,
            collider,
            captures_requested: 0,
            captures_rejected: 0,
            last_ticket: None,
        };
        entity.capture(booth, backend);
        entity.next_capture_at = now + entity.config.capture_interval_s();
        debug!(entity = name, targets = entity.target_count(), "impostor spawned");
        Ok(entity)
    }

    /// Per-frame update: recapture on deadline, then rebind textures.
    pub fn tick(
        &mut self,
        input: &TickInput,
        booth: &mut CaptureBooth,
        backend: &mut dyn RenderBackend,
    ) {
        if self.owned.is_none() {
            return;
        }
        // A due capture waits while the previous one is still queued.
        if input.now >= self.next_capture_at && !self.capture_in_flight(booth) {
            self.capture(booth, backend);
            self.next_capture_at = input.now + self.config.capture_interval_s();
        }
        let Some(viewer) = input.viewer else {
            return;
        };
        if let Some(view) = self.select_view(input.position, viewer, input.parent_rotation) {
            self.apply_view(view, backend);
        }
    }

    /// The view a viewer at `viewer` should see, or `None` when the
    /// bearing is undefined (viewer directly above or on the impostor).
    #[must_use]
    pub fn select_view(
        &self,
        position: Vec3,
        viewer: Vec3,
        parent_rotation: Option<Quat>,
    ) -> Option<DisplayedView> {
        let (from, to) = self.config.bearing.endpoints(position, viewer);
        let rotation = parent_rotation.filter(|_| self.config.follow_parent_rotation);
        let blend: OctantBlend = match rotation {
            Some(rotation) => octant_blend_rotating(
                from,
                forward_of(rotation),
                self.config.facing_correction_deg,
                to,
            )?,
            None => octant_blend(from, to)?,
        };

        let within = self.config.blend_distance <= 0.0
            || position.distance(viewer) <= self.config.blend_distance;
        if self.config.use_blending && within {
            Some(DisplayedView {
                primary: blend.low,
                secondary: Some(blend.high),
                blend: blend.t,
            })
        } else {
            Some(DisplayedView::single(blend.nearest()))
        }
    }

    fn apply_view(&mut self, view: DisplayedView, backend: &mut dyn RenderBackend) {
        if self.displayed == Some(view) {
            return;
        }
        let Some(owned) = &self.owned else {
            return;
        };
        let material = owned.material;
        let targets = &owned.targets;

        let mut bindings = vec![(TextureSlot::Main, targets.color_for(view.primary))];
        if let Some(depth) = targets.depth_for(view.primary) {
            bindings.push((TextureSlot::MainDepth, depth));
        }
        if let Some(secondary) = view.secondary {
            bindings.push((TextureSlot::Blend, targets.color_for(secondary)));
            if let Some(depth) = targets.depth_for(secondary) {
                bindings.push((TextureSlot::BlendDepth, depth));
            }
        }

        let result = bindings
            .into_iter()
            .try_for_each(|(slot, target)| backend.set_material_texture(material, slot, target))
            .and_then(|()| {
                backend.set_material_float(material, FloatParam::BlendAmount, view.blend)
            });
        match result {
            Ok(()) => self.displayed = Some(view),
            Err(err) => warn!(entity = %self.name, %err, "texture binding failed"),
        }
    }

    fn capture_in_flight(&self, booth: &CaptureBooth) -> bool {
        self.last_ticket.is_some_and(|ticket| !booth.is_complete(ticket))
    }

    fn capture(&mut self, booth: &mut CaptureBooth, backend: &mut dyn RenderBackend) {
        let Some(owned) = &self.owned else {
            return;
        };
        let instance = owned.instance;
        if let Err(err) = backend.set_instance_active(instance, true) {
            warn!(entity = %self.name, %err, "could not wake mesh clone for capture");
            return;
        }

        let animated = self.config.is_animated;
        let request = CaptureRequest::for_set(instance, &owned.targets)
            .with_scale(self.config.capture_scale)
            .with_rotation(self.capture_rotation())
            .with_overrides(self.camera_overrides())
            .on_complete(move |backend, _report| {
                if !animated && let Err(err) = backend.set_instance_active(instance, false) {
                    warn!(%instance, %err, "could not hide mesh clone after capture");
                }
            });

        self.captures_requested += 1;
        match booth.request_capture(backend, request) {
            Ok(ticket) => self.last_ticket = Some(ticket),
            Err(err) => {
                self.captures_rejected += 1;
                warn!(entity = %self.name, %err, "capture not scheduled");
                // The callback was dropped with the request.
                if !animated && let Err(err) = backend.set_instance_active(instance, false) {
                    warn!(%instance, %err, "could not hide mesh clone");
                }
            }
        }

        if self.config.dynamic_collider {
            let bounds = backend.instance_bounds(instance);
            self.quad_scale = quad_scale(&self.config, bounds.as_ref());
            self.collider = collider_box(&self.config, self.quad_scale);
        }
    }

    /// Releases the clone, every render target and the material.
    ///
    /// Captures still queued for this entity are discarded first.
    pub fn destroy(
        mut self,
        booth: &mut CaptureBooth,
        backend: &mut dyn RenderBackend,
    ) -> ReleaseSummary {
        let Some(owned) = self.owned.take() else {
            return ReleaseSummary::default();
        };
        let summary = ReleaseSummary {
            captures_discarded: booth.discard_pending(owned.instance),
            instance_destroyed: backend.destroy_instance(owned.instance),
            targets_released: owned.targets.release(backend),
            material_released: backend.destroy_material(owned.material),
        };
        debug!(entity = %self.name, ?summary, "impostor destroyed");
        summary
    }

    // -----------------------------------------------------------------------
    // Setters
    // -----------------------------------------------------------------------

    /// Switch between animated (`fps` captures per second) and static
    /// capture. Takes effect after the next capture.
    pub fn set_animated(&mut self, animated: bool, fps: u32) {
        self.config.is_animated = animated;
        self.config.target_fps = fps.clamp(1, 60);
    }

    pub fn set_static_interval(&mut self, seconds: f32) {
        self.config.static_interval_s = seconds.max(0.05);
    }

    /// `distance <= 0` blends at any distance.
    pub fn set_blending(&mut self, enabled: bool, distance: f32) {
        self.config.use_blending = enabled;
        self.config.blend_distance = distance;
    }

    pub fn set_capture_scale(&mut self, scale: f32) {
        self.config.capture_scale = scale.clamp(0.5, 3.0);
        self.request_recapture();
    }

    /// Euler degrees applied to the mesh while it is captured.
    pub fn set_mesh_rotation_offset(&mut self, degrees: Vec3) {
        self.config.mesh_rotation_offset = degrees.to_array();
        self.request_recapture();
    }

    /// Negative height/ratio and non-positive FOV/multiplier use the booth
    /// defaults.
    pub fn set_camera_overrides(
        &mut self,
        height: f32,
        look_at_ratio: f32,
        field_of_view: f32,
        distance_multiplier: f32,
    ) {
        self.config.camera_height = height;
        self.config.look_at_ratio = look_at_ratio;
        self.config.field_of_view = field_of_view;
        self.config.distance_multiplier = distance_multiplier;
        self.request_recapture();
    }

    pub fn set_follow_parent_rotation(&mut self, follow: bool) {
        self.config.follow_parent_rotation = follow;
    }

    pub fn set_facing_correction(&mut self, degrees: f32) {
        self.config.facing_correction_deg = degrees;
    }

    pub fn set_bearing_convention(&mut self, convention: BearingConvention) {
        self.config.bearing = convention;
    }

    /// Capture again on the next tick.
    pub fn request_recapture(&mut self) {
        self.next_capture_at = f64::NEG_INFINITY;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &ImpostorConfig {
        &self.config
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.owned.is_some()
    }

    #[must_use]
    pub fn displayed(&self) -> Option<DisplayedView> {
        self.displayed
    }

    #[must_use]
    pub fn render_targets(&self) -> Option<&RenderTargetSet> {
        self.owned.as_ref().map(|o| &o.targets)
    }

    #[must_use]
    pub fn target_count(&self) -> usize {
        self.render_targets().map_or(0, RenderTargetSet::target_count)
    }

    #[must_use]
    pub fn material(&self) -> Option<MaterialId> {
        self.owned.as_ref().map(|o| o.material)
    }

    #[must_use]
    pub fn mesh_instance(&self) -> Option<InstanceId> {
        self.owned.as_ref().map(|o| o.instance)
    }

    #[must_use]
    pub fn quad_scale(&self) -> Vec2 {
        self.quad_scale
    }

    #[must_use]
    pub fn collider(&self) -> Option<ColliderBox> {
        self.collider
    }

    #[must_use]
    pub fn next_capture_at(&self) -> f64 {
        self.next_capture_at
    }

    #[must_use]
    pub fn debug_info(&self) -> ImpostorDebugInfo {
        ImpostorDebugInfo {
            name: self.name.clone(),
            alive: self.is_alive(),
            animated: self.config.is_animated,
            parallax: self.render_targets().is_some_and(RenderTargetSet::has_depth),
            displayed: self.displayed,
            next_capture_at: self.next_capture_at,
            captures_requested: self.captures_requested,
            captures_rejected: self.captures_rejected,
            last_ticket: self.last_ticket,
            target_count: self.target_count(),
        }
    }

    fn capture_rotation(&self) -> Quat {
        let [x, y, z] = self.config.mesh_rotation_offset;
        Quat::from_euler(EulerRot::YXZ, y.to_radians(), x.to_radians(), z.to_radians())
    }

    fn camera_overrides(&self) -> CameraOverrides {
        CameraOverrides::from_sentinels(
            self.config.camera_height,
            self.config.look_at_ratio,
            self.config.field_of_view,
            self.config.distance_multiplier,
        )
    }
}

impl Drop for ImpostorEntity {
    fn drop(&mut self) {
        if let Some(owned) = &self.owned {
            warn!(
                entity = %self.name,
                targets = owned.targets.target_count(),
                "impostor dropped without destroy; backend resources leaked"
            );
        }
    }
}

fn build_material(
    backend: &mut dyn RenderBackend,
    config: &ImpostorConfig,
    targets: &RenderTargetSet,
    template: Option<MaterialId>,
) -> Result<MaterialId, ImpostorError> {
    let variant = if targets.has_depth() {
        ShaderVariant::Parallax
    } else {
        ShaderVariant::Clean
    };
    let material = backend.create_material(variant, template)?;

    let north = Octant::North;
    let mut result = backend
        .set_material_texture(material, TextureSlot::Main, targets.color_for(north))
        .and_then(|()| backend.set_material_float(material, FloatParam::BlendAmount, 0.0));
    if let Some(depth) = targets.depth_for(north) {
        result = result
            .and_then(|()| backend.set_material_texture(material, TextureSlot::MainDepth, depth));
        for (param, value) in parallax_params(config) {
            result = result.and_then(|()| backend.set_material_float(material, param, value));
        }
    }
    if let Err(err) = result {
        backend.destroy_material(material);
        return Err(err.into());
    }
    Ok(material)
}

#[cfg(test)]
mod tests {
    use meadow_config::BoothConfig;

    use super::*;
    use crate::headless::HeadlessBackend;
    use crate::mesh::MeshData;

    fn booth(drain_on_submit: bool) -> CaptureBooth {
        CaptureBooth::new(BoothConfig {
            render_target_size: 16,
            drain_on_submit,
            ..BoothConfig::default()
        })
    }

    fn clean_config() -> ImpostorConfig {
        ImpostorConfig {
            use_parallax: false,
            ..ImpostorConfig::default()
        }
    }

    fn cow_mesh(backend: &mut HeadlessBackend) -> MeshId {
        backend.register_mesh(MeshData::cuboid(
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::new(2.0, 1.0, 1.0),
            [120, 80, 40, 255],
        ))
    }

    fn spawn(
        name: &str,
        config: &ImpostorConfig,
        booth: &mut CaptureBooth,
        backend: &mut HeadlessBackend,
    ) -> ImpostorEntity {
        let mesh = cow_mesh(backend);
        let source = ImpostorSource {
            name,
            mesh: Some(mesh),
            material_template: None,
        };
        ImpostorEntity::spawn(source, config, booth, backend, 0.0).unwrap()
    }

    fn at(now: f64, viewer: Option<Vec3>) -> TickInput {
        TickInput {
            now,
            position: Vec3::ZERO,
            viewer,
            parent_rotation: None,
        }
    }

    fn on_circle(angle_deg: f32, radius: f32) -> Vec3 {
        let r = angle_deg.to_radians();
        Vec3::new(r.sin() * radius, 0.0, r.cos() * radius)
    }

    #[test]
    fn test_spawn_allocates_eight_targets() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let cow = spawn("Cow_1", &clean_config(), &mut booth, &mut backend);

        let stats = backend.stats();
        assert_eq!(stats.live_targets, 8);
        assert_eq!(stats.live_materials, 1);
        assert_eq!(stats.live_instances, 1);
        assert_eq!(booth.stats().completed, 1);

        let targets = cow.render_targets().unwrap();
        assert_eq!(backend.target_label(targets.color_for(Octant::North)), Some("Cow_1_North"));
        assert_eq!(
            backend.target_label(targets.color_for(Octant::NorthWest)),
            Some("Cow_1_NorthWest")
        );
        let material = cow.material().unwrap();
        assert_eq!(backend.material_variant(material), Some(ShaderVariant::Clean));

        let clone = cow.mesh_instance().unwrap();
        assert_eq!(backend.instance_active(clone), Some(false));
        assert_eq!(
            backend.instance_placement(clone).map(|p| p.position),
            Some(booth.park_position())
        );
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_parallax_doubles_targets_and_configures_shader() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let config = ImpostorConfig {
            use_parallax: true,
            parallax_strength: 0.05,
            parallax_min_samples: 6,
            parallax_max_samples: 20,
            ..ImpostorConfig::default()
        };
        let cow = spawn("Cow", &config, &mut booth, &mut backend);

        assert_eq!(backend.stats().live_targets, 16);
        assert_eq!(cow.target_count(), 16);
        let material = cow.material().unwrap();
        assert_eq!(backend.material_variant(material), Some(ShaderVariant::Parallax));
        assert_eq!(backend.material_float(material, FloatParam::ParallaxStrength), Some(0.05));
        assert_eq!(backend.material_float(material, FloatParam::ParallaxMinSamples), Some(6.0));
        assert_eq!(backend.material_float(material, FloatParam::ParallaxMaxSamples), Some(20.0));
        let depth = cow.render_targets().unwrap().depth_for(Octant::North);
        assert_eq!(backend.material_texture(material, TextureSlot::MainDepth), depth);
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_missing_mesh_source_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let source = ImpostorSource {
            name: "Ghost",
            mesh: None,
            material_template: None,
        };
        let result = ImpostorEntity::spawn(source, &clean_config(), &mut booth, &mut backend, 0.0);
        assert!(matches!(result, Err(ImpostorError::MissingMeshSource { .. })));
        assert_eq!(backend.stats(), Default::default());
    }

    #[test]
    fn test_failed_allocation_rolls_back() {
        let mut backend = HeadlessBackend::new().with_target_limit(12);
        let mut booth = booth(true);
        let mesh = cow_mesh(&mut backend);
        let source = ImpostorSource {
            name: "Cow",
            mesh: Some(mesh),
            material_template: None,
        };
        let config = ImpostorConfig {
            use_parallax: true,
            ..ImpostorConfig::default()
        };
        let result = ImpostorEntity::spawn(source, &config, &mut booth, &mut backend, 0.0);
        assert!(matches!(result, Err(ImpostorError::Backend(_))));
        let stats = backend.stats();
        assert_eq!(stats.live_targets, 0);
        assert_eq!(stats.live_instances, 0);
        assert_eq!(stats.live_materials, 0);
    }

    #[test]
    fn test_destroy_releases_every_resource() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let herd: Vec<ImpostorEntity> = (0..5)
            .map(|i| spawn(&format!("Cow_{i}"), &clean_config(), &mut booth, &mut backend))
            .collect();
        assert_eq!(backend.stats().live_targets, 40);
        assert_eq!(backend.stats().live_materials, 5);

        for cow in herd {
            let summary = cow.destroy(&mut booth, &mut backend);
            assert_eq!(summary.targets_released, 8);
            assert!(summary.material_released);
            assert!(summary.instance_destroyed);
        }
        let stats = backend.stats();
        assert_eq!(stats.live_targets, 0);
        assert_eq!(stats.live_materials, 0);
        assert_eq!(stats.live_instances, 0);
        assert_eq!(stats.target_bytes, 0);
    }

    #[test]
    fn test_viewer_north_without_blending() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let config = ImpostorConfig {
            use_blending: false,
            ..clean_config()
        };
        let mut cow = spawn("Cow", &config, &mut booth, &mut backend);
        // Start from a different view so the north view is a real change.
        cow.tick(&at(0.1, Some(Vec3::new(20.0, 0.0, 0.0))), &mut booth, &mut backend);
        assert_eq!(cow.displayed().unwrap().primary, Octant::East);

        cow.tick(&at(0.2, Some(Vec3::new(0.0, 1.7, 20.0))), &mut booth, &mut backend);
        let view = cow.displayed().unwrap();
        assert_eq!(view.primary, Octant::North);
        assert_eq!(view.secondary, None);
        assert_eq!(view.blend, 0.0);

        let material = cow.material().unwrap();
        let north = cow.render_targets().unwrap().color_for(Octant::North);
        assert_eq!(backend.material_texture(material, TextureSlot::Main), Some(north));
        assert_eq!(backend.material_float(material, FloatParam::BlendAmount), Some(0.0));
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_halfway_viewer_blends_neighbours() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let config = ImpostorConfig {
            use_blending: true,
            blend_distance: 0.0,
            ..clean_config()
        };
        let mut cow = spawn("Cow", &config, &mut booth, &mut backend);
        cow.tick(&at(0.1, Some(on_circle(22.5, 500.0))), &mut booth, &mut backend);

        let view = cow.displayed().unwrap();
        assert_eq!(view.primary, Octant::North);
        assert_eq!(view.secondary, Some(Octant::NorthEast));
        assert!((view.blend - 0.5).abs() < 1e-3);

        let material = cow.material().unwrap();
        let targets = cow.render_targets().unwrap();
        assert_eq!(
            backend.material_texture(material, TextureSlot::Blend),
            Some(targets.color_for(Octant::NorthEast))
        );
        let amount = backend.material_float(material, FloatParam::BlendAmount).unwrap();
        assert!((amount - 0.5).abs() < 1e-3);
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_blend_distance_limits_blending() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let config = ImpostorConfig {
            use_blending: true,
            blend_distance: 10.0,
            ..clean_config()
        };
        let mut cow = spawn("Cow", &config, &mut booth, &mut backend);

        cow.tick(&at(0.1, Some(on_circle(30.0, 30.0))), &mut booth, &mut backend);
        assert_eq!(cow.displayed(), Some(DisplayedView::single(Octant::NorthEast)));

        cow.tick(&at(0.2, Some(on_circle(30.0, 5.0))), &mut booth, &mut backend);
        let view = cow.displayed().unwrap();
        assert_eq!(view.secondary, Some(Octant::NorthEast));
        assert!((view.blend - 2.0 / 3.0).abs() < 1e-3);
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_missing_viewer_skips_texture_update() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let mut cow = spawn("Cow", &clean_config(), &mut booth, &mut backend);
        let before = cow.displayed();
        cow.tick(&at(0.1, None), &mut booth, &mut backend);
        assert_eq!(cow.displayed(), before);

        // Viewer standing on the impostor: bearing undefined, view kept.
        cow.tick(&at(0.2, Some(Vec3::new(0.0, 3.0, 0.0))), &mut booth, &mut backend);
        assert_eq!(cow.displayed(), before);
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_follows_parent_rotation() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let config = ImpostorConfig {
            use_blending: false,
            ..clean_config()
        };
        let mut cow = spawn("Cow", &config, &mut booth, &mut backend);
        let facing_east = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let viewer = Some(Vec3::new(20.0, 0.0, 0.0));

        let input = TickInput {
            parent_rotation: Some(facing_east),
            ..at(0.1, viewer)
        };
        cow.tick(&input, &mut booth, &mut backend);
        assert_eq!(cow.displayed().unwrap().primary, Octant::North);

        cow.set_follow_parent_rotation(false);
        cow.tick(&TickInput { now: 0.2, ..input }, &mut booth, &mut backend);
        assert_eq!(cow.displayed().unwrap().primary, Octant::East);

        cow.set_follow_parent_rotation(true);
        cow.set_facing_correction(180.0);
        cow.tick(&TickInput { now: 0.3, ..input }, &mut booth, &mut backend);
        assert_eq!(cow.displayed().unwrap().primary, Octant::South);
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_static_capture_cadence() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let config = ImpostorConfig {
            static_interval_s: 1.0,
            ..clean_config()
        };
        let mut cow = spawn("Cow", &config, &mut booth, &mut backend);
        assert_eq!(cow.debug_info().captures_requested, 1);
        assert_eq!(cow.next_capture_at(), 1.0);

        cow.tick(&at(0.5, None), &mut booth, &mut backend);
        assert_eq!(cow.debug_info().captures_requested, 1);
        cow.tick(&at(1.0, None), &mut booth, &mut backend);
        assert_eq!(cow.debug_info().captures_requested, 2);
        assert_eq!(cow.next_capture_at(), 2.0);

        let clone = cow.mesh_instance().unwrap();
        assert_eq!(backend.instance_active(clone), Some(false));
        assert_eq!(backend.stats().renders, 16);
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_animated_clone_stays_visible() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let config = ImpostorConfig {
            is_animated: true,
            target_fps: 10,
            ..clean_config()
        };
        let mut cow = spawn("Cow", &config, &mut booth, &mut backend);
        let clone = cow.mesh_instance().unwrap();
        assert_eq!(backend.instance_active(clone), Some(true));

        cow.tick(&at(0.05, None), &mut booth, &mut backend);
        assert_eq!(cow.debug_info().captures_requested, 1);
        cow.tick(&at(0.1, None), &mut booth, &mut backend);
        assert_eq!(cow.debug_info().captures_requested, 2);

        cow.set_animated(false, 10);
        cow.tick(&at(0.25, None), &mut booth, &mut backend);
        assert_eq!(backend.instance_active(clone), Some(false));
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_setters_force_recapture() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let mut cow = spawn("Cow", &clean_config(), &mut booth, &mut backend);

        cow.set_mesh_rotation_offset(Vec3::new(0.0, 180.0, 0.0));
        cow.tick(&at(0.1, None), &mut booth, &mut backend);
        assert_eq!(cow.debug_info().captures_requested, 2);

        cow.set_capture_scale(9.0);
        assert_eq!(cow.config().capture_scale, 3.0);
        cow.tick(&at(0.2, None), &mut booth, &mut backend);
        assert_eq!(cow.debug_info().captures_requested, 3);
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_quad_scale_and_collider_from_bounds() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let cow = spawn("Cow", &clean_config(), &mut booth, &mut backend);
        assert!(cow.quad_scale().abs_diff_eq(Vec2::splat(2.0), 1e-5));
        let collider = cow.collider().unwrap();
        assert!(collider.size.abs_diff_eq(Vec3::new(2.0, 2.0, 0.5), 1e-5));
        cow.destroy(&mut booth, &mut backend);
    }

    #[test]
    fn test_destroy_discards_queued_capture() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(false);
        let cow = spawn("Cow", &clean_config(), &mut booth, &mut backend);
        assert_eq!(booth.pending(), 1);

        let summary = cow.destroy(&mut booth, &mut backend);
        assert_eq!(summary.captures_discarded, 1);
        assert_eq!(booth.pending(), 0);
        assert_eq!(booth.drain(&mut backend), 0);
        assert_eq!(backend.stats().live_targets, 0);
    }

    #[test]
    fn test_slow_pump_keeps_one_capture_queued_per_entity() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(false);
        let config = ImpostorConfig {
            is_animated: true,
            target_fps: 60,
            ..clean_config()
        };
        let mut cows = [
            spawn("Cow_1", &config, &mut booth, &mut backend),
            spawn("Cow_2", &config, &mut booth, &mut backend),
        ];
        for frame in 1..=300_u32 {
            let input = at(f64::from(frame) / 60.0, None);
            for cow in &mut cows {
                cow.tick(&input, &mut booth, &mut backend);
            }
            assert!(booth.pending() <= cows.len());
            if frame % 2 == 0 {
                booth.pump(&mut backend, 1);
            }
        }
        for cow in &cows {
            let requested = cow.debug_info().captures_requested;
            assert!(requested > 50 && requested < 300);
        }
        for cow in cows {
            cow.destroy(&mut booth, &mut backend);
        }
        assert_eq!(booth.pending(), 0);
    }

    #[test]
    fn test_materials_are_private() {
        let mut backend = HeadlessBackend::new();
        let mut booth = booth(true);
        let template = backend.create_material(ShaderVariant::Clean, None).unwrap();
        let mesh = cow_mesh(&mut backend);
        let make = |name| ImpostorSource {
            name,
            mesh: Some(mesh),
            material_template: Some(template),
        };
        let config = ImpostorConfig {
            use_blending: false,
            ..clean_config()
        };
        let mut a = ImpostorEntity::spawn(make("A"), &config, &mut booth, &mut backend, 0.0).unwrap();
        let b = ImpostorEntity::spawn(make("B"), &config, &mut booth, &mut backend, 0.0).unwrap();
        assert_ne!(a.material(), b.material());
        assert_ne!(a.material(), Some(template));

        a.tick(&at(0.1, Some(Vec3::new(-9.0, 0.0, 0.0))), &mut booth, &mut backend);
        let a_main = backend.material_texture(a.material().unwrap(), TextureSlot::Main);
        let b_main = backend.material_texture(b.material().unwrap(), TextureSlot::Main);
        assert_eq!(a_main, Some(a.render_targets().unwrap().color_for(Octant::West)));
        assert_eq!(b_main, Some(b.render_targets().unwrap().color_for(Octant::North)));

        a.destroy(&mut booth, &mut backend);
        b.destroy(&mut booth, &mut backend);
        assert_eq!(backend.stats().live_materials, 1);
    }
}
