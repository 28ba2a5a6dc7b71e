//! `wgpu` implementation of [`RenderBackend`].

use glam::Mat4;
use meadow_impostor::{
    Aabb, BackendError, BackendStats, CaptureCamera, FloatParam, InstanceId, MaterialId, MeshData,
    MeshId, Placement, RenderBackend, RenderTargetDesc, ShaderVariant, TargetId, TargetKind,
    TextureSlot,
};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use crate::context::{GpuContext, GpuError};
use crate::material::{MaterialLayout, MaterialUniform, create_uniform_buffer};
use crate::pipeline::{
    COLOR_FORMAT, CapturePipeline, DEPTH_BUFFER_FORMAT, DEPTH_TARGET_FORMAT,
};
use crate::vertex::{CaptureVertex, DrawUniform};

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    bounds: Option<Aabb>,
}

struct GpuInstance {
    mesh: MeshId,
    label: String,
    placement: Placement,
    layer: u32,
    active: bool,
}

struct GpuTarget {
    desc: RenderTargetDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuMaterial {
    variant: ShaderVariant,
    uniform: MaterialUniform,
    uniform_buffer: wgpu::Buffer,
    textures: [Option<TargetId>; 4],
    bind_group: wgpu::BindGroup,
}

/// Renders captures on the GPU.
///
/// Targets are `Rgba8Unorm` (color) and `R16Float` (depth) textures usable
/// both as render attachments and as material inputs. Each target size
/// gets one shared `Depth32Float` z-buffer.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capture: CapturePipeline,
    materials_layout: MaterialLayout,
    meshes: FxHashMap<MeshId, GpuMesh>,
    instances: FxHashMap<InstanceId, GpuInstance>,
    targets: FxHashMap<TargetId, GpuTarget>,
    materials: FxHashMap<MaterialId, GpuMaterial>,
    depth_buffers: FxHashMap<u32, wgpu::TextureView>,
    next_id: u64,
    target_bytes: u64,
    renders: u64,
}

impl GpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let capture = CapturePipeline::new(&device);
        let materials_layout = MaterialLayout::new(&device, &queue);
        Self {
            device,
            queue,
            capture,
            materials_layout,
            meshes: FxHashMap::default(),
            instances: FxHashMap::default(),
            targets: FxHashMap::default(),
            materials: FxHashMap::default(),
            depth_buffers: FxHashMap::default(),
            next_id: 0,
            target_bytes: 0,
            renders: 0,
        }
    }

    /// Creates its own device without a window.
    pub fn new_headless() -> Result<Self, GpuError> {
        let ctx = GpuContext::new_headless_blocking()?;
        Ok(Self::new(ctx.device, ctx.queue))
    }

    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    #[must_use]
    pub fn material_layout(&self) -> &MaterialLayout {
        &self.materials_layout
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Uploads a mesh that instances can be created from.
    pub fn upload_mesh(&mut self, label: &str, mesh: &MeshData) -> MeshId {
        let vertices = CaptureVertex::from_mesh(mesh);
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-vertices")),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-indices")),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let id = MeshId(self.alloc_id());
        self.meshes.insert(
            id,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: mesh.indices.len() as u32,
                bounds: mesh.bounds(),
            },
        );
        debug!(mesh = %id, label, triangles = mesh.triangle_count(), "mesh uploaded");
        id
    }

    /// Bind group (group 1 of the impostor pipelines) for a material.
    #[must_use]
    pub fn material_bind_group(&self, material: MaterialId) -> Option<&wgpu::BindGroup> {
        self.materials.get(&material).map(|m| &m.bind_group)
    }

    #[must_use]
    pub fn material_variant(&self, material: MaterialId) -> Option<ShaderVariant> {
        self.materials.get(&material).map(|m| m.variant)
    }

    #[must_use]
    pub fn material_uniform(&self, material: MaterialId) -> Option<MaterialUniform> {
        self.materials.get(&material).map(|m| m.uniform)
    }

    #[must_use]
    pub fn target_view(&self, target: TargetId) -> Option<&wgpu::TextureView> {
        self.targets.get(&target).map(|t| &t.view)
    }

    #[must_use]
    pub fn instance_label(&self, instance: InstanceId) -> Option<&str> {
        self.instances.get(&instance).map(|i| i.label.as_str())
    }

    /// Copies a color target back to the CPU as row-major RGBA.
    pub fn read_color_target(&self, target: TargetId) -> Result<Vec<[u8; 4]>, BackendError> {
        let t = self.target_of_kind(target, TargetKind::Color)?;
        let size = t.desc.size;
        let unpadded = size * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("impostor-readback"),
            size: u64::from(padded * size),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("impostor-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &t.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size),
                },
            },
            extent(size),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|err| BackendError::Device(err.to_string()))?;
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(BackendError::Device(err.to_string())),
            Err(err) => return Err(BackendError::Device(err.to_string())),
        }

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((size * size) as usize);
        for row in 0..size {
            let start = (row * padded) as usize;
            let end = start + unpadded as usize;
            pixels.extend(
                mapped[start..end]
                    .chunks_exact(4)
                    .map(|px| [px[0], px[1], px[2], px[3]]),
            );
        }
        drop(mapped);
        buffer.unmap();
        Ok(pixels)
    }

    fn instance_mut(&mut self, instance: InstanceId) -> Result<&mut GpuInstance, BackendError> {
        self.instances
            .get_mut(&instance)
            .ok_or(BackendError::UnknownInstance(instance))
    }

    fn target_of_kind(&self, target: TargetId, kind: TargetKind) -> Result<&GpuTarget, BackendError> {
        let t = self
            .targets
            .get(&target)
            .ok_or(BackendError::UnknownTarget(target))?;
        if t.desc.kind != kind {
            return Err(BackendError::WrongTargetKind {
                target,
                expected: kind,
            });
        }
        Ok(t)
    }

    fn depth_buffer(&mut self, size: u32) -> &wgpu::TextureView {
        let device = &self.device;
        self.depth_buffers.entry(size).or_insert_with(|| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("impostor-capture-zbuffer"),
                    size: extent(size),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: DEPTH_BUFFER_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        })
    }

    fn rebuild_bind_group(&mut self, material: MaterialId) -> Result<(), BackendError> {
        let m = self
            .materials
            .get(&material)
            .ok_or(BackendError::UnknownMaterial(material))?;
        let views = m
            .textures
            .map(|slot| slot.and_then(|t| self.targets.get(&t)).map(|t| &t.view));
        let bind_group = self.materials_layout.bind_group(
            &self.device,
            &format!("{material}-bind-group"),
            &m.uniform_buffer,
            views,
        );
        if let Some(m) = self.materials.get_mut(&material) {
            m.bind_group = bind_group;
        }
        Ok(())
    }
}

fn extent(size: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size,
        height: size,
        depth_or_array_layers: 1,
    }
}

fn target_format(kind: TargetKind) -> wgpu::TextureFormat {
    match kind {
        TargetKind::Color => COLOR_FORMAT,
        TargetKind::Depth => DEPTH_TARGET_FORMAT,
    }
}

impl RenderBackend for GpuBackend {
    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<TargetId, BackendError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.size == 0 || desc.size > max {
            return Err(BackendError::InvalidTargetSize(desc.size));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: extent(desc.size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: target_format(desc.kind),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TargetId(self.alloc_id());
        self.target_bytes += desc.byte_size();
        self.targets.insert(
            id,
            GpuTarget {
                desc: desc.clone(),
                texture,
                view,
            },
        );
        Ok(id)
    }

    fn release_render_target(&mut self, target: TargetId) -> bool {
        match self.targets.remove(&target) {
            Some(t) => {
                self.target_bytes -= t.desc.byte_size();
                t.texture.destroy();
                true
            }
            None => {
                warn!(%target, "release of unknown render target");
                false
            }
        }
    }

    fn instantiate_mesh(&mut self, mesh: MeshId, label: &str) -> Result<InstanceId, BackendError> {
        if !self.meshes.contains_key(&mesh) {
            return Err(BackendError::UnknownMesh(mesh));
        }
        let id = InstanceId(self.alloc_id());
        self.instances.insert(
            id,
            GpuInstance {
                mesh,
                label: label.to_string(),
                placement: Placement::IDENTITY,
                layer: 0,
                active: true,
            },
        );
        Ok(id)
    }

    fn destroy_instance(&mut self, instance: InstanceId) -> bool {
        self.instances.remove(&instance).is_some()
    }

    fn set_instance_active(
        &mut self,
        instance: InstanceId,
        active: bool,
    ) -> Result<(), BackendError> {
        self.instance_mut(instance)?.active = active;
        Ok(())
    }

    fn instance_active(&self, instance: InstanceId) -> Option<bool> {
        self.instances.get(&instance).map(|i| i.active)
    }

    fn instance_placement(&self, instance: InstanceId) -> Option<Placement> {
        self.instances.get(&instance).map(|i| i.placement)
    }

    fn set_instance_placement(
        &mut self,
        instance: InstanceId,
        placement: Placement,
    ) -> Result<(), BackendError> {
        self.instance_mut(instance)?.placement = placement;
        Ok(())
    }

    fn instance_layer(&self, instance: InstanceId) -> Option<u32> {
        self.instances.get(&instance).map(|i| i.layer)
    }

    fn set_instance_layer(&mut self, instance: InstanceId, layer: u32) -> Result<(), BackendError> {
        self.instance_mut(instance)?.layer = layer;
        Ok(())
    }

    fn instance_bounds(&self, instance: InstanceId) -> Option<Aabb> {
        let inst = self.instances.get(&instance)?;
        let local = self.meshes.get(&inst.mesh)?.bounds?;
        Some(local.transformed(&inst.placement.matrix()))
    }

    fn create_material(
        &mut self,
        variant: ShaderVariant,
        template: Option<MaterialId>,
    ) -> Result<MaterialId, BackendError> {
        let (uniform, textures) = match template {
            Some(t) => {
                let m = self
                    .materials
                    .get(&t)
                    .ok_or(BackendError::UnknownMaterial(t))?;
                (m.uniform, m.textures)
            }
            None => (MaterialUniform::default(), [None; 4]),
        };
        let id = MaterialId(self.alloc_id());
        let uniform_buffer = create_uniform_buffer(&self.device, &format!("{id}-uniform"), &uniform);
        let views = textures.map(|slot| slot.and_then(|t| self.targets.get(&t)).map(|t| &t.view));
        let bind_group = self.materials_layout.bind_group(
            &self.device,
            &format!("{id}-bind-group"),
            &uniform_buffer,
            views,
        );
        self.materials.insert(
            id,
            GpuMaterial {
                variant,
                uniform,
                uniform_buffer,
                textures,
                bind_group,
            },
        );
        Ok(id)
    }

    fn destroy_material(&mut self, material: MaterialId) -> bool {
        match self.materials.remove(&material) {
            Some(m) => {
                m.uniform_buffer.destroy();
                true
            }
            None => false,
        }
    }

    fn set_material_texture(
        &mut self,
        material: MaterialId,
        slot: TextureSlot,
        target: TargetId,
    ) -> Result<(), BackendError> {
        let kind = if slot.is_depth() {
            TargetKind::Depth
        } else {
            TargetKind::Color
        };
        self.target_of_kind(target, kind)?;
        let m = self
            .materials
            .get_mut(&material)
            .ok_or(BackendError::UnknownMaterial(material))?;
        if m.textures[slot.index()] == Some(target) {
            return Ok(());
        }
        m.textures[slot.index()] = Some(target);
        self.rebuild_bind_group(material)
    }

    fn set_material_float(
        &mut self,
        material: MaterialId,
        param: FloatParam,
        value: f32,
    ) -> Result<(), BackendError> {
        let m = self
            .materials
            .get_mut(&material)
            .ok_or(BackendError::UnknownMaterial(material))?;
        m.uniform.set(param, value);
        self.queue
            .write_buffer(&m.uniform_buffer, 0, bytemuck::bytes_of(&m.uniform));
        Ok(())
    }

    fn render(
        &mut self,
        camera: &CaptureCamera,
        color: TargetId,
        depth: Option<TargetId>,
    ) -> Result<(), BackendError> {
        let size = self.target_of_kind(color, TargetKind::Color)?.desc.size;
        if let Some(d) = depth {
            let depth_size = self.target_of_kind(d, TargetKind::Depth)?.desc.size;
            if depth_size != size {
                return Err(BackendError::SizeMismatch {
                    color: size,
                    depth: depth_size,
                });
            }
        }
        // Materialise the z-buffer before borrowing targets for the pass.
        self.depth_buffer(size);

        let mut drawable: Vec<(InstanceId, MeshId, Mat4)> = self
            .instances
            .iter()
            .filter(|(_, i)| i.active && camera.sees_layer(i.layer))
            .map(|(id, i)| (*id, i.mesh, i.placement.matrix()))
            .collect();
        drawable.sort_by_key(|(id, _, _)| *id);

        let view_proj = camera.view_projection();
        let draws: Vec<(&GpuMesh, wgpu::BindGroup)> = drawable
            .iter()
            .filter_map(|(_, mesh, model)| {
                let mesh = self.meshes.get(mesh)?;
                let uniform = DrawUniform::new(view_proj * *model);
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("capture-draw-uniform"),
                        contents: bytemuck::bytes_of(&uniform),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("capture-draw-bind-group"),
                    layout: &self.capture.draw_bind_group_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                });
                Some((mesh, bind_group))
            })
            .collect();

        let color_view = &self
            .targets
            .get(&color)
            .ok_or(BackendError::UnknownTarget(color))?
            .view;
        let depth_view = match depth {
            Some(d) => Some(&self.targets.get(&d).ok_or(BackendError::UnknownTarget(d))?.view),
            None => None,
        };
        let zbuffer = self
            .depth_buffers
            .get(&size)
            .ok_or_else(|| BackendError::Device(format!("no z-buffer for size {size}")))?;

        let [r, g, b, a] = camera.clear_color.map(f64::from);
        let mut attachments = vec![Some(wgpu::RenderPassColorAttachment {
            view: color_view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                store: wgpu::StoreOp::Store,
            },
        })];
        if let Some(view) = depth_view {
            attachments.push(Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    // Far plane.
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 1.0,
                        g: 0.0,
                        b: 0.0,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            }));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("impostor-capture-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("impostor-capture-pass"),
                color_attachments: &attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: zbuffer,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            let pipeline = if depth_view.is_some() {
                &self.capture.color_depth
            } else {
                &self.capture.color_only
            };
            pass.set_pipeline(pipeline);
            for (mesh, bind_group) in &draws {
                pass.set_bind_group(0, bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
        self.queue.submit(Some(encoder.finish()));
        drop(attachments);
        drop(draws);
        self.renders += 1;
        Ok(())
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            live_targets: self.targets.len(),
            live_materials: self.materials.len(),
            live_instances: self.instances.len(),
            target_bytes: self.target_bytes,
            renders: self.renders,
        }
    }
}
