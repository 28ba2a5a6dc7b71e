//! Compass-octant math for directional impostors.
//!
//! The horizontal plane is split into eight 45° buckets. Octant 0 looks
//! down +Z (North) and indices grow clockwise when seen from above, so
//! octant 2 is +X (East) and octant 4 is -Z (South). Angles are measured
//! around the vertical axis from a reference forward to a flattened
//! direction and normalized into `[0, 360)` before bucketing.
//!
//! All functions are pure. A zero-length horizontal direction has no
//! defined bearing and yields `None`; callers keep their previous octant.

use std::fmt;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Number of compass buckets.
pub const OCTANT_COUNT: usize = 8;

/// Angular width of one bucket in degrees.
pub const OCTANT_SPAN_DEG: f64 = 45.0;

/// Angles closer than this to a bucket boundary are snapped onto it, so
/// `90.00000x` coming out of `atan2` still lands exactly on East.
const BOUNDARY_SNAP_DEG: f64 = 1e-4;

/// Horizontal directions shorter than this are treated as degenerate.
const MIN_HORIZONTAL_LENGTH_SQ: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Octant
// ---------------------------------------------------------------------------

/// One of the eight canonical capture directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Octant {
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
}

impl Octant {
    /// Canonical order. Index `i` of every per-direction array in the
    /// system corresponds to `ALL[i]`.
    pub const ALL: [Octant; OCTANT_COUNT] = [
        Octant::North,
        Octant::NorthEast,
        Octant::East,
        Octant::SouthEast,
        Octant::South,
        Octant::SouthWest,
        Octant::West,
        Octant::NorthWest,
    ];

    /// Octant for an arbitrary index, wrapping modulo 8.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self::ALL[index % OCTANT_COUNT]
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Compass name used in render target labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Octant::North => "North",
            Octant::NorthEast => "NorthEast",
            Octant::East => "East",
            Octant::SouthEast => "SouthEast",
            Octant::South => "South",
            Octant::SouthWest => "SouthWest",
            Octant::West => "West",
            Octant::NorthWest => "NorthWest",
        }
    }

    /// The clockwise neighbour.
    #[must_use]
    pub const fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    /// Bearing of this octant's centre in degrees from North.
    #[must_use]
    pub fn bearing_deg(self) -> f32 {
        self.index() as f32 * OCTANT_SPAN_DEG as f32
    }

    /// Unit horizontal vector pointing along this octant's bearing.
    #[must_use]
    pub fn bearing(self) -> Vec3 {
        let radians = self.bearing_deg().to_radians();
        Vec3::new(radians.sin(), 0.0, radians.cos())
    }
}

impl fmt::Display for Octant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Two neighbouring octants and the interpolation weight between them.
///
/// `t` is in `[0, 1)`: 0 shows only `low`, values approaching 1 lean
/// towards `high`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctantBlend {
    pub low: Octant,
    pub high: Octant,
    pub t: f32,
}

impl OctantBlend {
    /// The octant `round()` would pick for the same angle.
    #[must_use]
    pub fn nearest(&self) -> Octant {
        if self.t >= 0.5 { self.high } else { self.low }
    }
}

// ---------------------------------------------------------------------------
// Bearing convention
// ---------------------------------------------------------------------------

/// Which way the impostor/viewer vector points before it is bucketed.
///
/// `ViewerFromImpostor` measures where the viewer stands as seen from the
/// impostor: a viewer north of the impostor selects octant 0, which the
/// capture booth renders from the north side. `ImpostorFromViewer` flips
/// the vector and therefore selects the opposite octant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BearingConvention {
    #[default]
    ViewerFromImpostor,
    ImpostorFromViewer,
}

impl BearingConvention {
    /// `(from, to)` argument order for the octant functions.
    #[must_use]
    pub fn endpoints(self, impostor: Vec3, viewer: Vec3) -> (Vec3, Vec3) {
        match self {
            BearingConvention::ViewerFromImpostor => (impostor, viewer),
            BearingConvention::ImpostorFromViewer => (viewer, impostor),
        }
    }
}

// ---------------------------------------------------------------------------
// Angles
// ---------------------------------------------------------------------------

/// Yaw of a vector around +Y in degrees, `0` along +Z and `+90` along +X.
///
/// Returns `None` when the vector has no horizontal component.
#[must_use]
pub fn yaw_deg(v: Vec3) -> Option<f64> {
    let (x, z) = (f64::from(v.x), f64::from(v.z));
    if x * x + z * z <= MIN_HORIZONTAL_LENGTH_SQ {
        return None;
    }
    Some(x.atan2(z).to_degrees())
}

/// Wrap an angle into `[0, 360)`, snapping values within a hair of a 45°
/// boundary onto that boundary.
#[must_use]
pub fn normalize_degrees(angle: f64) -> f64 {
    let mut a = angle.rem_euclid(360.0);
    let boundary = (a / OCTANT_SPAN_DEG).round() * OCTANT_SPAN_DEG;
    if (a - boundary).abs() < BOUNDARY_SNAP_DEG {
        a = boundary;
    }
    if a >= 360.0 { a - 360.0 } else { a }
}

/// Signed clockwise angle from `forward` to `direction` around the
/// vertical axis, normalized into `[0, 360)`. Both vectors are flattened.
#[must_use]
pub fn angle_from_forward(forward: Vec3, direction: Vec3) -> Option<f64> {
    Some(normalize_degrees(yaw_deg(direction)? - yaw_deg(forward)?))
}

/// Nearest octant for an angle in degrees (any range).
#[must_use]
pub fn octant_from_angle(angle_deg: f64) -> Octant {
    let a = normalize_degrees(angle_deg);
    Octant::from_index((a / OCTANT_SPAN_DEG).round() as usize)
}

/// Neighbouring octants and blend weight for an angle in degrees.
#[must_use]
pub fn blend_from_angle(angle_deg: f64) -> OctantBlend {
    let exact = normalize_degrees(angle_deg) / OCTANT_SPAN_DEG;
    let floor = exact.floor();
    let mut low = Octant::from_index(floor as usize);
    let mut t = (exact - floor) as f32;
    // f64 -> f32 can round 0.99999999 up to 1.0.
    if t >= 1.0 {
        low = low.next();
        t = 0.0;
    }
    OctantBlend {
        low,
        high: low.next(),
        t,
    }
}

// ---------------------------------------------------------------------------
// World-axis variants
// ---------------------------------------------------------------------------

/// Octant of `to` as seen from `from`, measured against world North.
#[must_use]
pub fn octant_index(from: Vec3, to: Vec3) -> Option<Octant> {
    angle_from_forward(Vec3::Z, to - from).map(octant_from_angle)
}

/// Blend pair of `to` as seen from `from`, measured against world North.
#[must_use]
pub fn octant_blend(from: Vec3, to: Vec3) -> Option<OctantBlend> {
    angle_from_forward(Vec3::Z, to - from).map(blend_from_angle)
}

// ---------------------------------------------------------------------------
// Rotation-aware variants
// ---------------------------------------------------------------------------

/// Forward (+Z) axis of a rotation.
#[must_use]
pub fn forward_of(rotation: Quat) -> Vec3 {
    rotation * Vec3::Z
}

fn corrected_forward(forward: Vec3, offset_deg: f32) -> Vec3 {
    Quat::from_rotation_y(offset_deg.to_radians()) * forward
}

/// Octant of `to` relative to `from`'s own facing.
///
/// `offset_deg` is a fixed yaw applied to `forward` before measuring,
/// correcting for an entity whose forward axis is not the direction its
/// captured front should face.
#[must_use]
pub fn octant_index_rotating(from: Vec3, forward: Vec3, offset_deg: f32, to: Vec3) -> Option<Octant> {
    angle_from_forward(corrected_forward(forward, offset_deg), to - from).map(octant_from_angle)
}

/// Blend pair of `to` relative to `from`'s own facing.
#[must_use]
pub fn octant_blend_rotating(
    from: Vec3,
    forward: Vec3,
    offset_deg: f32,
    to: Vec3,
) -> Option<OctantBlend> {
    angle_from_forward(corrected_forward(forward, offset_deg), to - from).map(blend_from_angle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_circle(angle_deg: f32, radius: f32) -> Vec3 {
        let r = angle_deg.to_radians();
        Vec3::new(r.sin() * radius, 0.0, r.cos() * radius)
    }

    #[test]
    fn test_octant_names_follow_index_order() {
        let names: Vec<&str> = Octant::ALL.iter().map(|o| o.name()).collect();
        assert_eq!(
            names,
            [
                "North",
                "NorthEast",
                "East",
                "SouthEast",
                "South",
                "SouthWest",
                "West",
                "NorthWest"
            ]
        );
        for (i, octant) in Octant::ALL.iter().enumerate() {
            assert_eq!(octant.index(), i);
            assert_eq!(Octant::from_index(i + 8), *octant);
        }
    }

    #[test]
    fn test_bearing_vectors() {
        assert!(Octant::North.bearing().abs_diff_eq(Vec3::Z, 1e-6));
        assert!(Octant::East.bearing().abs_diff_eq(Vec3::X, 1e-6));
        assert!(Octant::South.bearing().abs_diff_eq(-Vec3::Z, 1e-6));
        assert!(Octant::West.bearing().abs_diff_eq(-Vec3::X, 1e-6));
    }

    #[test]
    fn test_index_is_periodic() {
        let mut angle = 0.0_f64;
        while angle < 360.0 {
            assert_eq!(octant_from_angle(angle), octant_from_angle(angle + 360.0));
            assert_eq!(octant_from_angle(angle), octant_from_angle(angle - 360.0));
            angle += 0.37;
        }
    }

    #[test]
    fn test_blend_matches_floor_formula() {
        let mut angle = 0.0_f64;
        while angle < 360.0 {
            let blend = blend_from_angle(angle);
            let exact = angle / 45.0;
            let expected_low = (exact.floor() as usize) % 8;
            assert_eq!(blend.low.index(), expected_low, "angle {angle}");
            assert_eq!(blend.high.index(), (expected_low + 1) % 8);
            assert!((0.0..1.0).contains(&blend.t));
            assert!((f64::from(blend.t) - (exact - exact.floor())).abs() < 1e-4);
            angle += 1.3;
        }
    }

    #[test]
    fn test_exact_boundaries_have_zero_blend() {
        for (i, octant) in Octant::ALL.iter().enumerate() {
            let angle = i as f64 * 45.0;
            assert_eq!(octant_from_angle(angle), *octant);
            let blend = blend_from_angle(angle);
            assert_eq!(blend.low, *octant);
            assert_eq!(blend.t, 0.0);
        }
    }

    #[test]
    fn test_boundaries_from_positions() {
        for octant in Octant::ALL {
            let viewer = octant.bearing() * 10.0;
            assert_eq!(octant_index(Vec3::ZERO, viewer), Some(octant));
            let blend = octant_blend(Vec3::ZERO, viewer).unwrap();
            assert_eq!(blend.low, octant);
            assert_eq!(blend.t, 0.0);
        }
    }

    #[test]
    fn test_wraparound_near_north() {
        assert_eq!(octant_from_angle(359.0), Octant::North);
        assert_eq!(octant_from_angle(340.0), Octant::North);
        assert_eq!(octant_from_angle(336.0), Octant::NorthWest);
        let blend = blend_from_angle(350.0);
        assert_eq!(blend.low, Octant::NorthWest);
        assert_eq!(blend.high, Octant::North);
        assert!(blend.t > 0.7);
    }

    #[test]
    fn test_viewer_north_selects_north() {
        let impostor = Vec3::new(5.0, 0.0, 5.0);
        let viewer = impostor + Vec3::new(0.0, 1.7, 20.0);
        assert_eq!(octant_index(impostor, viewer), Some(Octant::North));
    }

    #[test]
    fn test_halfway_between_north_and_northeast() {
        let viewer = on_circle(22.5, 30.0);
        let blend = octant_blend(Vec3::ZERO, viewer).unwrap();
        assert_eq!(blend.low, Octant::North);
        assert_eq!(blend.high, Octant::NorthEast);
        assert!((blend.t - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_height_is_ignored() {
        let low = octant_blend(Vec3::ZERO, Vec3::new(3.0, 0.0, 4.0)).unwrap();
        let high = octant_blend(Vec3::new(0.0, -50.0, 0.0), Vec3::new(3.0, 80.0, 4.0)).unwrap();
        assert_eq!(low, high);
    }

    #[test]
    fn test_zero_direction_is_undefined() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(octant_index(p, p), None);
        assert_eq!(octant_blend(p, p + Vec3::Y * 4.0), None);
        assert_eq!(angle_from_forward(Vec3::Y, Vec3::Z), None);
    }

    #[test]
    fn test_rotating_variant_follows_forward() {
        // Entity faces East; a viewer straight ahead of it is "North" in
        // the entity's frame.
        let viewer = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(octant_index_rotating(Vec3::ZERO, Vec3::X, 0.0, viewer), Some(Octant::North));
        // Viewer behind it.
        assert_eq!(
            octant_index_rotating(Vec3::ZERO, Vec3::X, 0.0, -viewer),
            Some(Octant::South)
        );
        // Viewer to its right (South in world terms).
        assert_eq!(
            octant_index_rotating(Vec3::ZERO, Vec3::X, 0.0, Vec3::new(0.0, 0.0, -10.0)),
            Some(Octant::East)
        );
    }

    #[test]
    fn test_rotating_offset_turns_forward() {
        let viewer = Vec3::new(10.0, 0.0, 0.0);
        // +Z forward turned by 90° now points East.
        assert_eq!(octant_index_rotating(Vec3::ZERO, Vec3::Z, 90.0, viewer), Some(Octant::North));
        assert_eq!(octant_index_rotating(Vec3::ZERO, Vec3::Z, 180.0, viewer), Some(Octant::West));
    }

    #[test]
    fn test_rotating_blend_matches_world_when_facing_north() {
        for step in 0..32 {
            let viewer = on_circle(step as f32 * 11.25 + 3.0, 12.0);
            let world = octant_blend(Vec3::ZERO, viewer).unwrap();
            let rotating = octant_blend_rotating(Vec3::ZERO, Vec3::Z, 0.0, viewer).unwrap();
            assert_eq!(world.low, rotating.low);
            assert!((world.t - rotating.t).abs() < 1e-5);
        }
    }

    #[test]
    fn test_forward_of_rotation() {
        let east = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        assert!(forward_of(east).abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn test_bearing_convention_flips_octant() {
        let impostor = Vec3::ZERO;
        let viewer = Vec3::new(0.0, 0.0, 8.0);
        let (from, to) = BearingConvention::ViewerFromImpostor.endpoints(impostor, viewer);
        assert_eq!(octant_index(from, to), Some(Octant::North));
        let (from, to) = BearingConvention::ImpostorFromViewer.endpoints(impostor, viewer);
        assert_eq!(octant_index(from, to), Some(Octant::South));
    }

    #[test]
    fn test_nearest_agrees_with_index() {
        let mut angle = 0.25_f64;
        while angle < 360.0 {
            assert_eq!(blend_from_angle(angle).nearest(), octant_from_angle(angle), "angle {angle}");
            angle += 2.0;
        }
    }
}
