//! The shared off-screen capture rig.
//!
//! A [`CaptureBooth`] owns one virtual camera and one capture zone far from
//! the playable world. Requests are queued and served strictly in
//! submission order, one at a time: the mesh instance is moved onto the
//! booth layer at the zone, rendered from the eight canonical directions
//! (North first, clockwise) into the caller's targets, put back exactly
//! where it was, and only then is the completion callback invoked.
//!
//! The booth is an ordinary value owned by the application and passed to
//! every impostor by `&mut`; there is no global instance.

use std::collections::VecDeque;
use std::fmt;

use glam::{Quat, Vec3};
use meadow_config::BoothConfig;
use meadow_octant::{OCTANT_COUNT, Octant};
use tracing::{debug, error, warn};

use crate::backend::{
    CaptureCamera, InstanceId, Placement, Projection, RenderBackend, TargetId, layer_mask,
};
use crate::bounds::Aabb;
use crate::error::ImpostorError;
use crate::targets::RenderTargetSet;

/// Directions rendered per request.
pub const DIRECTION_COUNT: usize = OCTANT_COUNT;

/// Camera distances are never allowed closer than this.
pub const MIN_CAMERA_DISTANCE: f32 = 0.5;

/// Invoked once a request has rendered all directions and the instance has
/// been restored.
pub type CaptureCallback = Box<dyn FnOnce(&mut dyn RenderBackend, &CaptureReport) + Send + Sync>;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Per-request camera overrides. `None` uses the booth setting.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraOverrides {
    pub height: Option<f32>,
    pub look_at_ratio: Option<f32>,
    pub field_of_view: Option<f32>,
    pub distance_multiplier: Option<f32>,
}

impl CameraOverrides {
    /// Converts configuration sentinels: height and ratio apply when
    /// `>= 0`, field of view and distance multiplier when `> 0`.
    #[must_use]
    pub fn from_sentinels(
        height: f32,
        look_at_ratio: f32,
        field_of_view: f32,
        distance_multiplier: f32,
    ) -> Self {
        Self {
            height: (height >= 0.0).then_some(height),
            look_at_ratio: (look_at_ratio >= 0.0).then_some(look_at_ratio),
            field_of_view: (field_of_view > 0.0).then_some(field_of_view),
            distance_multiplier: (distance_multiplier > 0.0).then_some(distance_multiplier),
        }
    }
}

/// One capture job.
pub struct CaptureRequest {
    pub instance: InstanceId,
    pub targets: Vec<TargetId>,
    pub depth_targets: Option<Vec<TargetId>>,
    pub scale: f32,
    pub rotation: Quat,
    pub overrides: CameraOverrides,
    pub on_complete: Option<CaptureCallback>,
}

impl CaptureRequest {
    pub fn new(instance: InstanceId, targets: impl Into<Vec<TargetId>>) -> Self {
        Self {
            instance,
            targets: targets.into(),
            depth_targets: None,
            scale: 1.0,
            rotation: Quat::IDENTITY,
            overrides: CameraOverrides::default(),
            on_complete: None,
        }
    }

    /// Request color and depth targets from a complete set.
    pub fn for_set(instance: InstanceId, set: &RenderTargetSet) -> Self {
        let mut request = Self::new(instance, set.color().to_vec());
        request.depth_targets = set.depth().map(|d| d.to_vec());
        request
    }

    #[must_use]
    pub fn with_depth(mut self, depth: impl Into<Vec<TargetId>>) -> Self {
        self.depth_targets = Some(depth.into());
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: CameraOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    #[must_use]
    pub fn on_complete(
        mut self,
        callback: impl FnOnce(&mut dyn RenderBackend, &CaptureReport) + Send + Sync + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for CaptureRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureRequest")
            .field("instance", &self.instance)
            .field("targets", &self.targets.len())
            .field("depth_targets", &self.depth_targets.as_ref().map(Vec::len))
            .field("scale", &self.scale)
            .field("rotation", &self.rotation)
            .field("overrides", &self.overrides)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

/// Identifies an accepted request. Tickets grow monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaptureTicket(pub u64);

impl fmt::Display for CaptureTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capture#{}", self.0)
    }
}

/// Outcome handed to the completion callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureReport {
    pub ticket: CaptureTicket,
    pub instance: InstanceId,
    /// Directions rendered successfully.
    pub rendered: usize,
    /// Directions whose render failed.
    pub failed: usize,
    /// Camera distance used for every direction.
    pub camera_distance: f32,
}

impl CaptureReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failed == 0 && self.rendered == DIRECTION_COUNT
    }
}

/// Booth state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoothState {
    Idle,
    Capturing(CaptureTicket),
}

/// Running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoothStats {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub renders: u64,
    pub failed_renders: u64,
}

struct Pending {
    ticket: CaptureTicket,
    request: CaptureRequest,
}

// ---------------------------------------------------------------------------
// Booth
// ---------------------------------------------------------------------------

/// Serialized capture service.
pub struct CaptureBooth {
    settings: BoothConfig,
    queue: VecDeque<Pending>,
    state: BoothState,
    next_ticket: u64,
    /// Every ticket below this value has completed.
    completed_through: u64,
    stats: BoothStats,
}

impl CaptureBooth {
    #[must_use]
    pub fn new(settings: BoothConfig) -> Self {
        let mut settings = settings;
        if settings.layer >= 32 {
            warn!(layer = settings.layer, "booth layer out of range; using 31");
            settings.layer = 31;
        }
        settings.render_target_size = settings.render_target_size.max(1);
        Self {
            settings,
            queue: VecDeque::new(),
            state: BoothState::Idle,
            next_ticket: 0,
            completed_through: 0,
            stats: BoothStats::default(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &BoothConfig {
        &self.settings
    }

    #[must_use]
    pub fn state(&self) -> BoothState {
        self.state
    }

    /// Requests waiting to be served.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn stats(&self) -> BoothStats {
        self.stats
    }

    #[must_use]
    pub fn is_complete(&self, ticket: CaptureTicket) -> bool {
        ticket.0 < self.completed_through
    }

    #[must_use]
    pub fn zone_position(&self) -> Vec3 {
        Vec3::from_array(self.settings.position)
    }

    /// Where impostor clones wait between captures.
    #[must_use]
    pub fn park_position(&self) -> Vec3 {
        Vec3::from_array(self.settings.park_position)
    }

    /// Allocates the 8 (or 16) targets an impostor renders into.
    pub fn create_render_target_set(
        &self,
        backend: &mut dyn RenderBackend,
        name: &str,
        with_depth: bool,
    ) -> Result<RenderTargetSet, ImpostorError> {
        Ok(RenderTargetSet::create(
            backend,
            name,
            self.settings.render_target_size,
            with_depth,
        )?)
    }

    /// Validates and enqueues a request.
    ///
    /// Malformed requests are logged and rejected without touching the
    /// queue; their callback is dropped unused. When the booth is idle and
    /// `drain_on_submit` is set, the queue is served before returning.
    pub fn request_capture(
        &mut self,
        backend: &mut dyn RenderBackend,
        request: CaptureRequest,
    ) -> Result<CaptureTicket, ImpostorError> {
        if let Err(err) = validate(&*backend, &request) {
            error!(instance = %request.instance, %err, "capture request rejected");
            self.stats.rejected += 1;
            return Err(err);
        }

        let ticket = CaptureTicket(self.next_ticket);
        self.next_ticket += 1;
        self.stats.submitted += 1;
        self.queue.push_back(Pending { ticket, request });
        debug!(%ticket, queued = self.queue.len(), "capture queued");

        if self.settings.drain_on_submit && self.state == BoothState::Idle {
            self.drain(backend);
        }
        Ok(ticket)
    }

    /// Serves up to `budget` queued requests in order. Returns the number
    /// served.
    pub fn pump(&mut self, backend: &mut dyn RenderBackend, budget: usize) -> usize {
        let mut served = 0;
        while served < budget && self.serve_next(backend) {
            served += 1;
        }
        served
    }

    /// Serves the whole queue.
    pub fn drain(&mut self, backend: &mut dyn RenderBackend) -> usize {
        self.pump(backend, usize::MAX)
    }

    /// Drops queued (not yet served) requests for an instance that is
    /// going away. Their callbacks never run.
    pub fn discard_pending(&mut self, instance: InstanceId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|p| p.request.instance != instance);
        let dropped = before - self.queue.len();
        if dropped > 0 {
            debug!(%instance, dropped, "discarded queued captures");
        }
        dropped
    }

    fn serve_next(&mut self, backend: &mut dyn RenderBackend) -> bool {
        if let BoothState::Capturing(ticket) = self.state {
            warn!(%ticket, "booth is busy; capture not started");
            return false;
        }
        let Some(Pending { ticket, request }) = self.queue.pop_front() else {
            return false;
        };

        self.state = BoothState::Capturing(ticket);
        let report = self.run(backend, ticket, &request);
        self.completed_through = ticket.0 + 1;
        self.stats.completed += 1;
        self.stats.renders += report.rendered as u64;
        self.stats.failed_renders += report.failed as u64;
        self.state = BoothState::Idle;

        if !report.succeeded() {
            warn!(%ticket, failed = report.failed, "capture finished with failures");
        }
        if let Some(callback) = request.on_complete {
            callback(backend, &report);
        }
        true
    }

    fn run(
        &self,
        backend: &mut dyn RenderBackend,
        ticket: CaptureTicket,
        request: &CaptureRequest,
    ) -> CaptureReport {
        let mut report = CaptureReport {
            ticket,
            instance: request.instance,
            rendered: 0,
            failed: 0,
            camera_distance: 0.0,
        };

        let instance = request.instance;
        let (Some(saved_layer), Some(saved_placement)) = (
            backend.instance_layer(instance),
            backend.instance_placement(instance),
        ) else {
            warn!(%ticket, %instance, "capture instance vanished before it was served");
            report.failed = DIRECTION_COUNT;
            return report;
        };

        let base = self.zone_position();
        let staged = backend
            .set_instance_layer(instance, self.settings.layer)
            .and_then(|()| {
                backend.set_instance_placement(instance, Placement::new(base, request.rotation))
            });

        if let Err(err) = staged {
            warn!(%ticket, %err, "could not stage instance in the capture zone");
            report.failed = DIRECTION_COUNT;
        } else {
            let bounds = backend
                .instance_bounds(instance)
                .unwrap_or_else(|| Aabb::from_center_size(base, Vec3::ONE));
            let depth = request.depth_targets.as_deref();
            for (i, octant) in Octant::ALL.iter().enumerate() {
                let camera =
                    self.camera_for(&bounds, base, *octant, request.scale, &request.overrides);
                report.camera_distance = camera_distance_of(&camera, base);
                match backend.render(&camera, request.targets[i], depth.map(|d| d[i])) {
                    Ok(()) => report.rendered += 1,
                    Err(err) => {
                        warn!(%ticket, direction = %octant, %err, "capture render failed");
                        report.failed += 1;
                    }
                }
            }
        }

        let restored = backend
            .set_instance_layer(instance, saved_layer)
            .and_then(|()| backend.set_instance_placement(instance, saved_placement));
        if let Err(err) = restored {
            warn!(%ticket, %err, "could not restore instance after capture");
        }
        report
    }

    /// Camera distance and projection for a mesh with the given bounds.
    #[must_use]
    pub fn framing(
        &self,
        bounds: &Aabb,
        scale: f32,
        overrides: &CameraOverrides,
    ) -> (f32, Projection) {
        let s = &self.settings;
        let size = bounds.size();
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let multiplier = overrides
            .distance_multiplier
            .unwrap_or(s.camera_distance_multiplier);

        if s.use_perspective {
            let fov = overrides
                .field_of_view
                .unwrap_or(s.field_of_view)
                .clamp(1.0, 179.0);
            let target_height = size.y * s.padding_multiplier * scale;
            let distance = (target_height * 0.5) / (fov * 0.5).to_radians().tan() * multiplier;
            (
                distance.max(MIN_CAMERA_DISTANCE),
                Projection::Perspective { fov_y_deg: fov },
            )
        } else {
            let max_extent = size.max_element();
            let half_extent = (max_extent * s.padding_multiplier * scale * 0.5)
                .clamp(s.min_ortho_size, s.max_ortho_size.max(s.min_ortho_size));
            let distance = max_extent * multiplier;
            (
                distance.max(MIN_CAMERA_DISTANCE),
                Projection::Orthographic { half_extent },
            )
        }
    }

    /// Camera pose for one direction.
    ///
    /// The camera stands on the `octant` side of `base` and looks back
    /// across it, so target `i` shows the mesh as seen by a viewer at
    /// bearing `i`.
    #[must_use]
    pub fn camera_for(
        &self,
        bounds: &Aabb,
        base: Vec3,
        octant: Octant,
        scale: f32,
        overrides: &CameraOverrides,
    ) -> CaptureCamera {
        let s = &self.settings;
        let (distance, projection) = self.framing(bounds, scale, overrides);
        let height = overrides.height.unwrap_or(s.camera_height);
        let ratio = overrides.look_at_ratio.unwrap_or(s.look_at_height_ratio);

        let look = -octant.bearing();
        let mut position = base - look * distance;
        position.y = base.y + height;
        let target = base + Vec3::Y * (bounds.size().y * ratio);

        CaptureCamera {
            position,
            target,
            up: Vec3::Y,
            projection,
            near: s.near_plane,
            far: s.far_plane,
            layer_mask: layer_mask(s.layer),
            clear_color: s.background,
        }
    }
}

fn camera_distance_of(camera: &CaptureCamera, base: Vec3) -> f32 {
    let d = camera.position - base;
    (d.x * d.x + d.z * d.z).sqrt()
}

fn validate(backend: &dyn RenderBackend, request: &CaptureRequest) -> Result<(), ImpostorError> {
    if request.targets.len() != DIRECTION_COUNT {
        return Err(ImpostorError::TargetCountMismatch {
            expected: DIRECTION_COUNT,
            actual: request.targets.len(),
        });
    }
    if let Some(depth) = &request.depth_targets
        && depth.len() != DIRECTION_COUNT
    {
        return Err(ImpostorError::DepthTargetCountMismatch {
            expected: DIRECTION_COUNT,
            actual: depth.len(),
        });
    }
    if backend.instance_placement(request.instance).is_none() {
        return Err(ImpostorError::UnknownInstance(request.instance));
    }
    Ok(())
}
