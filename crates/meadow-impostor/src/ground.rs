//! Ground snapping for spawned impostors.

use glam::Vec3;
use meadow_config::ImpostorConfig;

/// Probe casts start this far above the position being snapped.
pub const PROBE_START_HEIGHT: f32 = 100.0;
/// How far down a probe cast searches from its start.
pub const PROBE_DISTANCE: f32 = 200.0;

/// Height queries answered by whatever owns the collision world.
pub trait GroundProbe {
    /// Height of the highest ground surface at `(x, z)` whose layer is in
    /// `layer_mask`, or `None` when there is no ground there.
    fn ground_height(&self, x: f32, z: f32, layer_mask: u32) -> Option<f32>;
}

/// Infinite plane at a fixed height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatGround {
    pub height: f32,
    pub layer: u32,
}

impl FlatGround {
    #[must_use]
    pub fn new(height: f32) -> Self {
        Self { height, layer: 0 }
    }
}

impl GroundProbe for FlatGround {
    fn ground_height(&self, _x: f32, _z: f32, layer_mask: u32) -> Option<f32> {
        let bit = 1u32.checked_shl(self.layer)?;
        (layer_mask & bit != 0).then_some(self.height)
    }
}

/// Moves `position` onto the ground below it when snapping is enabled.
///
/// Only hits inside the probe window count; otherwise the position is
/// returned unchanged.
#[must_use]
pub fn snap_to_ground(probe: &dyn GroundProbe, position: Vec3, config: &ImpostorConfig) -> Vec3 {
    if !config.snap_to_ground {
        return position;
    }
    let top = position.y + PROBE_START_HEIGHT;
    let bottom = top - PROBE_DISTANCE;
    match probe.ground_height(position.x, position.z, config.ground_layers) {
        Some(height) if (bottom..=top).contains(&height) => {
            Vec3::new(position.x, height + config.ground_offset, position.z)
        }
        _ => position,
    }
}
