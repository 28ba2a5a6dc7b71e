//! Minimal triangle rasterizer for the headless backend.
//!
//! Flat-shaded, no culling, depth tested against normalized device depth.
//! Pixels are sampled at their centers and row 0 is the top of the image.

use glam::{Mat4, Vec2, Vec3};

use crate::mesh::MeshData;

/// Clip-space w below which a vertex counts as behind the camera.
const MIN_CLIP_W: f32 = 1e-5;

pub(crate) struct Canvas<'a> {
    pub size: u32,
    pub color: &'a mut [[u8; 4]],
    pub zbuf: &'a mut [f32],
}

impl Canvas<'_> {
    pub fn draw(&mut self, mvp: &Mat4, mesh: &MeshData) {
        for tri in mesh.indices.chunks_exact(3) {
            let mut screen = [Vec3::ZERO; 3];
            let mut visible = true;
            for (slot, &index) in screen.iter_mut().zip(tri) {
                let Some(p) = mesh.positions.get(index as usize) else {
                    visible = false;
                    break;
                };
                let clip = *mvp * p.extend(1.0);
                if clip.w <= MIN_CLIP_W {
                    visible = false;
                    break;
                }
                let ndc = clip.truncate() / clip.w;
                let size = self.size as f32;
                *slot = Vec3::new(
                    (ndc.x * 0.5 + 0.5) * size,
                    (0.5 - ndc.y * 0.5) * size,
                    ndc.z,
                );
            }
            if visible {
                self.fill(screen, mesh.color(tri[0] as usize));
            }
        }
    }

    fn fill(&mut self, s: [Vec3; 3], color: [u8; 4]) {
        let area = edge(s[0].truncate(), s[1].truncate(), s[2].truncate());
        if area.abs() < 1e-9 {
            return;
        }
        let last = self.size as f32 - 1.0;
        let min = s[0].min(s[1]).min(s[2]);
        let max = s[0].max(s[1]).max(s[2]);
        if max.x < 0.0 || max.y < 0.0 || min.x > last + 1.0 || min.y > last + 1.0 {
            return;
        }
        let x0 = min.x.floor().clamp(0.0, last) as u32;
        let x1 = max.x.ceil().clamp(0.0, last) as u32;
        let y0 = min.y.floor().clamp(0.0, last) as u32;
        let y1 = max.y.ceil().clamp(0.0, last) as u32;

        for y in y0..=y1 {
            for x in x0..=x1 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let b0 = edge(s[1].truncate(), s[2].truncate(), p) / area;
                let b1 = edge(s[2].truncate(), s[0].truncate(), p) / area;
                let b2 = edge(s[0].truncate(), s[1].truncate(), p) / area;
                if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                    continue;
                }
                let z = b0 * s[0].z + b1 * s[1].z + b2 * s[2].z;
                if !(0.0..=1.0).contains(&z) {
                    continue;
                }
                let i = (y * self.size + x) as usize;
                if z < self.zbuf[i] {
                    self.zbuf[i] = z;
                    self.color[i] = color;
                }
            }
        }
    }
}

fn edge(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Linear RGBA float to RGBA8.
pub(crate) fn to_rgba8(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}
