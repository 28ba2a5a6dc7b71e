//! CPU-side mesh data shared by the headless and GPU backends.

use glam::Vec3;

use crate::bounds::Aabb;

/// An indexed triangle list with per-vertex colors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub colors: Vec<[u8; 4]>,
    pub indices: Vec<u32>,
}

/// Face order for [`MeshData::cuboid_faces`].
pub const CUBOID_FACES: [Vec3; 6] = [
    Vec3::X,
    Vec3::NEG_X,
    Vec3::Y,
    Vec3::NEG_Y,
    Vec3::Z,
    Vec3::NEG_Z,
];

impl MeshData {
    /// Box with one color per face, in [`CUBOID_FACES`] order.
    #[must_use]
    pub fn cuboid_faces(center: Vec3, size: Vec3, colors: [[u8; 4]; 6]) -> Self {
        let half = size.abs() * 0.5;
        let mut mesh = MeshData::default();
        for (normal, color) in CUBOID_FACES.iter().zip(colors) {
            // Two axes spanning the face.
            let (u, v) = if normal.x != 0.0 {
                (Vec3::Z, Vec3::Y)
            } else if normal.y != 0.0 {
                (Vec3::X, Vec3::Z)
            } else {
                (Vec3::X, Vec3::Y)
            };
            let base = mesh.positions.len() as u32;
            let face_center = center + *normal * half;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                mesh.positions.push(face_center + u * half * su + v * half * sv);
                mesh.colors.push(color);
            }
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// Box with a single color.
    #[must_use]
    pub fn cuboid(center: Vec3, size: Vec3, color: [u8; 4]) -> Self {
        Self::cuboid_faces(center, size, [color; 6])
    }

    /// Appends another mesh, re-basing its indices.
    pub fn append(&mut self, other: &MeshData) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.colors.extend_from_slice(&other.colors);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Local-space bounds, `None` for an empty mesh.
    #[must_use]
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions.iter().copied())
    }

    /// Color for a vertex, opaque white when the color stream is short.
    #[must_use]
    pub fn color(&self, vertex: usize) -> [u8; 4] {
        self.colors.get(vertex).copied().unwrap_or([255; 4])
    }
}
