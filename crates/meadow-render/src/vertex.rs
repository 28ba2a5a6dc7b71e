//! GPU vertex and uniform layouts.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use meadow_impostor::MeshData;

/// Booth mesh vertex: position and linear RGBA color.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CaptureVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

static_assertions::assert_eq_size!(CaptureVertex, [u8; 28]);

impl CaptureVertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{VertexAttribute, VertexFormat};

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<CaptureVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: VertexFormat::Float32x4,
                },
            ],
        }
    }

    /// Vertices of `mesh`; missing colors default to opaque white.
    #[must_use]
    pub fn from_mesh(mesh: &MeshData) -> Vec<Self> {
        mesh.positions
            .iter()
            .enumerate()
            .map(|(i, p)| Self {
                position: p.to_array(),
                color: mesh.color(i).map(|c| f32::from(c) / 255.0),
            })
            .collect()
    }
}

/// Per-draw model-view-projection matrix.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DrawUniform {
    pub mvp: [[f32; 4]; 4],
}

static_assertions::assert_eq_size!(DrawUniform, [u8; 64]);

impl DrawUniform {
    #[must_use]
    pub fn new(mvp: Mat4) -> Self {
        Self {
            mvp: mvp.to_cols_array_2d(),
        }
    }
}

/// Display camera for impostor quads.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ImpostorCameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
}

static_assertions::assert_eq_size!(ImpostorCameraUniform, [u8; 80]);

impl ImpostorCameraUniform {
    #[must_use]
    pub fn new(view_proj: Mat4, camera_pos: Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: camera_pos.extend(1.0).to_array(),
        }
    }
}

/// Impostor quad corner with its tangent frame for parallax.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ImpostorVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
}

static_assertions::assert_eq_size!(ImpostorVertex, [u8; 44]);

impl ImpostorVertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{VertexAttribute, VertexFormat};

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ImpostorVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: VertexFormat::Float32x2,
                },
                VertexAttribute {
                    offset: 20,
                    shader_location: 2,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    offset: 32,
                    shader_location: 3,
                    format: VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Corners of a `width` x `height` quad standing on `base`, rotated by
/// `rotation` so its +Z face is the front. Counter-clockwise from the
/// bottom left; index with [`QUAD_INDICES`].
#[must_use]
pub fn impostor_quad(base: Vec3, rotation: Quat, width: f32, height: f32) -> [ImpostorVertex; 4] {
    let right = rotation * Vec3::X;
    let up = rotation * Vec3::Y;
    let normal = rotation * Vec3::Z;
    let half = right * (width * 0.5);
    let corners = [
        (base - half, [0.0, 1.0]),
        (base + half, [1.0, 1.0]),
        (base + half + up * height, [1.0, 0.0]),
        (base - half + up * height, [0.0, 0.0]),
    ];
    corners.map(|(p, uv)| ImpostorVertex {
        position: p.to_array(),
        uv,
        normal: normal.to_array(),
        tangent: right.to_array(),
    })
}

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertices_from_mesh() {
        let mesh = MeshData::cuboid(Vec3::ZERO, Vec3::ONE, [255, 0, 51, 255]);
        let vertices = CaptureVertex::from_mesh(&mesh);
        assert_eq!(vertices.len(), mesh.positions.len());
        assert_eq!(vertices[0].color, [1.0, 0.0, 0.2, 1.0]);
    }

    #[test]
    fn test_vertex_layout_stride() {
        assert_eq!(CaptureVertex::layout().array_stride, 28);
        assert_eq!(ImpostorVertex::layout().array_stride, 44);
    }

    #[test]
    fn test_camera_uniform_packs_position() {
        let uniform = ImpostorCameraUniform::new(Mat4::IDENTITY, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(uniform.camera_pos, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(uniform.view_proj[0], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_quad_faces_front() {
        let quad = impostor_quad(Vec3::ZERO, Quat::IDENTITY, 2.0, 3.0);
        assert_eq!(quad[0].position, [-1.0, 0.0, 0.0]);
        assert_eq!(quad[2].position, [1.0, 3.0, 0.0]);
        assert!(quad.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
        assert_eq!(quad[3].uv, [0.0, 0.0]);
    }
}
