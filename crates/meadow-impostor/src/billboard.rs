//! Camera-facing rotation for impostor quads.

use glam::{EulerRot, Quat, Vec3};
use meadow_config::BillboardConfig;

/// Alignment below which a settling billboard counts as arrived.
const SETTLED_DEG: f32 = 0.1;

/// Rotates a quad so its +Z face points at the camera.
///
/// With smoothing on, a billboard at rest ignores camera moves smaller
/// than the dead zone; once it starts turning it keeps turning until it
/// is aligned again.
#[derive(Debug, Clone)]
pub struct Billboard {
    settings: BillboardConfig,
    current: Option<Quat>,
    settling: bool,
}

impl Billboard {
    #[must_use]
    pub fn new(settings: BillboardConfig) -> Self {
        Self {
            settings,
            current: None,
            settling: false,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &BillboardConfig {
        &self.settings
    }

    /// Last rotation returned by [`face`](Self::face).
    #[must_use]
    pub fn current(&self) -> Option<Quat> {
        self.current
    }

    /// The fully aligned rotation, or `None` when the camera sits on the
    /// quad (or straight above it with the Y lock on).
    #[must_use]
    pub fn target_rotation(&self, quad_pos: Vec3, camera_pos: Vec3) -> Option<Quat> {
        let mut to_camera = camera_pos - quad_pos;
        if self.settings.lock_to_y_axis {
            to_camera.y = 0.0;
        }
        let dir = to_camera.try_normalize()?;
        let yaw = dir.x.atan2(dir.z);
        let pitch = if self.settings.lock_to_y_axis {
            0.0
        } else {
            -dir.y.clamp(-1.0, 1.0).asin()
        };
        Some(Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0))
    }

    /// Advance by `dt` seconds and return the rotation to apply.
    pub fn face(&mut self, quad_pos: Vec3, camera_pos: Vec3, dt: f32) -> Quat {
        let Some(target) = self.target_rotation(quad_pos, camera_pos) else {
            return self.current.unwrap_or(Quat::IDENTITY);
        };
        let current = match self.current {
            Some(current) if self.settings.smooth_rotation => current,
            _ => {
                self.current = Some(target);
                return target;
            }
        };

        let off_deg = current.angle_between(target).to_degrees();
        if !self.settling && off_deg <= self.settings.dead_zone_deg {
            return current;
        }
        self.settling = true;

        let t = 1.0 - (-self.settings.rotation_speed * dt.max(0.0)).exp();
        let next = current.slerp(target, t).normalize();
        if next.angle_between(target).to_degrees() <= SETTLED_DEG {
            self.settling = false;
        }
        self.current = Some(next);
        next
    }

    /// Forget the current rotation; the next call snaps.
    pub fn reset(&mut self) {
        self.current = None;
        self.settling = false;
    }
}
