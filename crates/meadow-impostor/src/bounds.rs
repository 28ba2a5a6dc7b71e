//! Bounding boxes and the quad/collider sizes derived from them.

use glam::{Mat4, Vec2, Vec3};
use meadow_config::ImpostorConfig;

/// Collider depth used when the box is derived from the quad.
pub const AUTO_COLLIDER_DEPTH: f32 = 0.5;

/// Axis-aligned bounding box in world or local space.
///
/// Invariant: `min <= max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create an AABB from two corners in any order.
    #[must_use]
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    #[must_use]
    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Smallest box containing every point, or `None` for an empty set.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| Self {
            min: acc.min.min(p),
            max: acc.max.max(p),
        }))
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Bounds of this box after an affine transform (all 8 corners).
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let corners = (0..8).map(|i| {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            matrix.transform_point3(corner)
        });
        // Eight corners are never empty.
        Aabb::from_points(corners).unwrap_or(*self)
    }
}

/// Scale for the impostor quad.
///
/// A manual size wins; otherwise the larger of the bounds' width and
/// height gives a square quad; without bounds the quad stays unit sized.
/// The multiplier applies in every case.
#[must_use]
pub fn quad_scale(config: &ImpostorConfig, bounds: Option<&Aabb>) -> Vec2 {
    let multiplier = config.quad_scale_multiplier;
    let [mx, my] = config.quad_manual_size;
    if mx > 0.0 && my > 0.0 {
        return Vec2::new(mx, my) * multiplier;
    }
    match bounds {
        Some(b) if config.auto_quad_scale => {
            let size = b.size();
            Vec2::splat(size.x.max(size.y) * multiplier)
        }
        _ => Vec2::splat(multiplier),
    }
}

/// Box collider attached to the quad, in the quad's world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderBox {
    pub center: Vec3,
    pub size: Vec3,
}

/// Collider for the quad, or `None` when auto-generation is off.
#[must_use]
pub fn collider_box(config: &ImpostorConfig, quad: Vec2) -> Option<ColliderBox> {
    if !config.auto_generate_collider {
        return None;
    }
    let manual = Vec3::from_array(config.collider_size);
    let center = Vec3::from_array(config.collider_center);
    if manual.cmpgt(Vec3::ZERO).any() {
        return Some(ColliderBox {
            center,
            size: manual.abs(),
        });
    }
    Some(ColliderBox {
        center: Vec3::ZERO,
        size: Vec3::new(quad.x.abs(), quad.y.abs(), AUTO_COLLIDER_DEPTH),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_new_sorts_corners() {
        let b = Aabb::new(Vec3::new(1.0, -2.0, 3.0), Vec3::new(-1.0, 2.0, 0.0));
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_from_points_empty() {
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_transformed_rotation_swaps_extents() {
        let b = Aabb::from_center_size(Vec3::ZERO, Vec3::new(4.0, 1.0, 2.0));
        let m = Mat4::from_rotation_translation(
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(10.0, 0.0, 0.0),
        );
        let t = b.transformed(&m);
        assert!(t.size().abs_diff_eq(Vec3::new(2.0, 1.0, 4.0), 1e-5));
        assert!(t.center().abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_quad_scale_from_bounds() {
        let config = ImpostorConfig::default();
        let bounds = Aabb::from_center_size(Vec3::ZERO, Vec3::new(2.0, 1.5, 3.0));
        assert_eq!(quad_scale(&config, Some(&bounds)), Vec2::splat(2.0));
    }

    #[test]
    fn test_quad_scale_manual_wins() {
        let config = ImpostorConfig {
            quad_manual_size: [3.0, 1.0],
            quad_scale_multiplier: 2.0,
            ..ImpostorConfig::default()
        };
        let bounds = Aabb::from_center_size(Vec3::ZERO, Vec3::splat(9.0));
        assert_eq!(quad_scale(&config, Some(&bounds)), Vec2::new(6.0, 2.0));
    }

    #[test]
    fn test_quad_scale_without_bounds() {
        let config = ImpostorConfig {
            quad_scale_multiplier: 1.5,
            ..ImpostorConfig::default()
        };
        assert_eq!(quad_scale(&config, None), Vec2::splat(1.5));
    }

    #[test]
    fn test_auto_collider_uses_quad() {
        let config = ImpostorConfig::default();
        let c = collider_box(&config, Vec2::new(2.0, 3.0)).unwrap();
        assert_eq!(c.size, Vec3::new(2.0, 3.0, AUTO_COLLIDER_DEPTH));
        assert_eq!(c.center, Vec3::ZERO);
    }

    #[test]
    fn test_manual_collider() {
        let config = ImpostorConfig {
            collider_size: [1.0, 2.0, 1.0],
            collider_center: [0.0, 1.0, 0.0],
            ..ImpostorConfig::default()
        };
        let c = collider_box(&config, Vec2::ONE).unwrap();
        assert_eq!(c.size, Vec3::new(1.0, 2.0, 1.0));
        assert_eq!(c.center, Vec3::Y);
    }

    #[test]
    fn test_collider_disabled() {
        let config = ImpostorConfig {
            auto_generate_collider: false,
            ..ImpostorConfig::default()
        };
        assert!(collider_box(&config, Vec2::ONE).is_none());
    }
}
