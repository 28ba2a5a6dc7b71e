//! Detects which way a mesh's modelled front points.
//!
//! Walking meshes are authored facing different axes. Watching the mesh's
//! rotation against its actual movement tells which quarter-turn yaw
//! offset lines the modelled front up with the direction of travel.

use glam::{Quat, Vec3};
use tracing::debug;

/// Yaw offsets tried, in degrees.
pub const CANDIDATE_OFFSETS: [f32; 4] = [0.0, 90.0, 180.0, 270.0];
/// Minimum alignment for a sample to count.
pub const ALIGNMENT_THRESHOLD: f32 = 0.8;
/// Accepted samples needed before deciding.
pub const REQUIRED_SAMPLES: u32 = 3;

#[derive(Debug, Clone, Default)]
pub struct OrientationProbe {
    votes: [u32; 4],
    samples: u32,
    decided: Option<f32>,
}

impl OrientationProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one observation of the mesh rotation and its movement.
    ///
    /// Returns the chosen offset once enough samples agree, and the same
    /// value on every later call.
    pub fn observe(&mut self, mesh_rotation: Quat, movement: Vec3) -> Option<f32> {
        if self.decided.is_some() {
            return self.decided;
        }
        let movement = Vec3::new(movement.x, 0.0, movement.z).try_normalize()?;

        let (best, dot) = CANDIDATE_OFFSETS
            .iter()
            .enumerate()
            .map(|(i, offset)| {
                let forward = mesh_rotation * Quat::from_rotation_y(offset.to_radians()) * Vec3::Z;
                let forward = Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero();
                (i, forward.dot(movement))
            })
            .fold((0, f32::MIN), |acc, c| if c.1 > acc.1 { c } else { acc });
        if dot <= ALIGNMENT_THRESHOLD {
            return None;
        }

        self.votes[best] += 1;
        self.samples += 1;
        if self.samples < REQUIRED_SAMPLES {
            return None;
        }
        // Ties go to the smaller offset.
        let winner = (0..CANDIDATE_OFFSETS.len())
            .rev()
            .max_by_key(|&i| self.votes[i])
            .unwrap_or(0);
        let offset = CANDIDATE_OFFSETS[winner];
        debug!(offset, samples = self.samples, "mesh orientation detected");
        self.decided = Some(offset);
        self.decided
    }

    #[must_use]
    pub fn decided(&self) -> Option<f32> {
        self.decided
    }

    #[must_use]
    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_facing_mesh_needs_no_offset() {
        let mut probe = OrientationProbe::new();
        assert_eq!(probe.observe(Quat::IDENTITY, Vec3::Z), None);
        assert_eq!(probe.observe(Quat::IDENTITY, Vec3::Z), None);
        assert_eq!(probe.observe(Quat::IDENTITY, Vec3::Z), Some(0.0));
    }

    #[test]
    fn test_backwards_mesh_detects_half_turn() {
        let mut probe = OrientationProbe::new();
        let mut result = None;
        for _ in 0..REQUIRED_SAMPLES {
            result = probe.observe(Quat::IDENTITY, -Vec3::Z);
        }
        assert_eq!(result, Some(180.0));
    }

    #[test]
    fn test_sideways_mesh_under_rotation() {
        let mut probe = OrientationProbe::new();
        let yaw = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        for _ in 0..REQUIRED_SAMPLES {
            // Mesh turned to +X but walking toward -Z: a 90 degree yaw on
            // top of the existing rotation points it at -Z.
            probe.observe(yaw, -Vec3::Z);
        }
        assert_eq!(probe.decided(), Some(90.0));
    }

    #[test]
    fn test_diagonal_samples_are_rejected() {
        let mut probe = OrientationProbe::new();
        for _ in 0..10 {
            assert_eq!(probe.observe(Quat::IDENTITY, Vec3::new(1.0, 0.0, 1.0)), None);
        }
        assert_eq!(probe.samples(), 0);
    }

    #[test]
    fn test_standing_still_is_ignored() {
        let mut probe = OrientationProbe::new();
        assert_eq!(probe.observe(Quat::IDENTITY, Vec3::Y), None);
        assert_eq!(probe.samples(), 0);
    }

    #[test]
    fn test_decision_sticks() {
        let mut probe = OrientationProbe::new();
        for _ in 0..REQUIRED_SAMPLES {
            probe.observe(Quat::IDENTITY, Vec3::X);
        }
        assert_eq!(probe.decided(), Some(90.0));
        assert_eq!(probe.observe(Quat::IDENTITY, Vec3::Z), Some(90.0));
        probe.reset();
        assert_eq!(probe.decided(), None);
    }
}
