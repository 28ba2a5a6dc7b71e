//! Impostor material uniforms, bind group layout and display pipelines.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use meadow_impostor::{FloatParam, ShaderVariant, TextureSlot};
use wgpu::util::DeviceExt;

use crate::pipeline::{COLOR_FORMAT, DEPTH_TARGET_FORMAT};
use crate::vertex::ImpostorVertex;

/// WGSL source for `Meadow/ImpostorClean`.
pub const IMPOSTOR_CLEAN_SHADER_SOURCE: &str = concat!(
    include_str!("shaders/impostor_common.wgsl"),
    include_str!("shaders/impostor_clean.wgsl")
);

/// WGSL source for `Meadow/ImpostorParallax`.
pub const IMPOSTOR_PARALLAX_SHADER_SOURCE: &str = concat!(
    include_str!("shaders/impostor_common.wgsl"),
    include_str!("shaders/impostor_parallax.wgsl")
);

#[must_use]
pub fn shader_source(variant: ShaderVariant) -> &'static str {
    match variant {
        ShaderVariant::Clean => IMPOSTOR_CLEAN_SHADER_SOURCE,
        ShaderVariant::Parallax => IMPOSTOR_PARALLAX_SHADER_SOURCE,
    }
}

/// Float parameters in [`FloatParam`] order.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    pub blend_amount: f32,
    pub parallax_strength: f32,
    pub parallax_min_samples: f32,
    pub parallax_max_samples: f32,
}

static_assertions::assert_eq_size!(MaterialUniform, [u8; 16]);

impl Default for MaterialUniform {
    fn default() -> Self {
        let mut uniform = Self::zeroed();
        for param in FloatParam::ALL {
            uniform.set(param, param.default_value());
        }
        uniform
    }
}

impl MaterialUniform {
    pub fn set(&mut self, param: FloatParam, value: f32) {
        match param {
            FloatParam::BlendAmount => self.blend_amount = value,
            FloatParam::ParallaxStrength => self.parallax_strength = value,
            FloatParam::ParallaxMinSamples => self.parallax_min_samples = value,
            FloatParam::ParallaxMaxSamples => self.parallax_max_samples = value,
        }
    }

    #[must_use]
    pub fn get(&self, param: FloatParam) -> f32 {
        match param {
            FloatParam::BlendAmount => self.blend_amount,
            FloatParam::ParallaxStrength => self.parallax_strength,
            FloatParam::ParallaxMinSamples => self.parallax_min_samples,
            FloatParam::ParallaxMaxSamples => self.parallax_max_samples,
        }
    }
}

/// Binding index of a texture slot in the material bind group.
#[must_use]
pub fn slot_binding(slot: TextureSlot) -> u32 {
    2 + slot.index() as u32
}

/// Shared material bind group layout, sampler and the 1x1 placeholders
/// bound to empty slots.
pub struct MaterialLayout {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub camera_bind_group_layout: wgpu::BindGroupLayout,
    pub sampler: wgpu::Sampler,
    pub placeholder_color: wgpu::TextureView,
    pub placeholder_depth: wgpu::TextureView,
}

impl MaterialLayout {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(16),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        entries.extend(TextureSlot::ALL.map(|slot| texture_entry(slot_binding(slot))));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("impostor-material-bgl"),
            entries: &entries,
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("impostor-camera-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(80),
                    },
                    count: None,
                }],
            });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("impostor-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // Transparent color; depth 1.0 (half float) so parallax sees empty space.
        let placeholder_color = placeholder(
            device,
            queue,
            "impostor-placeholder-color",
            COLOR_FORMAT,
            &[0, 0, 0, 0],
        );
        let one_half = 0x3c00u16.to_le_bytes();
        let placeholder_depth = placeholder(
            device,
            queue,
            "impostor-placeholder-depth",
            DEPTH_TARGET_FORMAT,
            &one_half,
        );

        Self {
            bind_group_layout,
            camera_bind_group_layout,
            sampler,
            placeholder_color,
            placeholder_depth,
        }
    }

    /// Bind group for a material; `views` are indexed by [`TextureSlot::index`],
    /// `None` entries use the placeholders.
    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        label: &str,
        uniform: &wgpu::Buffer,
        views: [Option<&wgpu::TextureView>; 4],
    ) -> wgpu::BindGroup {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        for slot in TextureSlot::ALL {
            let fallback = if slot.is_depth() {
                &self.placeholder_depth
            } else {
                &self.placeholder_color
            };
            let view = views[slot.index()].unwrap_or(fallback);
            entries.push(wgpu::BindGroupEntry {
                binding: slot_binding(slot),
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.bind_group_layout,
            entries: &entries,
        })
    }
}

fn placeholder(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    format: wgpu::TextureFormat,
    texel: &[u8],
) -> wgpu::TextureView {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        texel,
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// Alpha-blended pipeline that draws impostor quads with one shader variant.
pub struct ImpostorPipeline {
    pub variant: ShaderVariant,
    pub pipeline: wgpu::RenderPipeline,
}

impl ImpostorPipeline {
    pub fn new(
        device: &wgpu::Device,
        layout: &MaterialLayout,
        variant: ShaderVariant,
        surface_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(variant.shader_name()),
            source: wgpu::ShaderSource::Wgsl(shader_source(variant).into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("impostor-pipeline-layout"),
            bind_group_layouts: &[&layout.camera_bind_group_layout, &layout.bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(variant.shader_name()),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_impostor"),
                buffers: &[ImpostorVertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_impostor"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });

        Self { variant, pipeline }
    }
}

/// Uniform buffer initialised with `uniform`.
pub(crate) fn create_uniform_buffer(
    device: &wgpu::Device,
    label: &str,
    uniform: &MaterialUniform,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(uniform),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::create_test_device_queue;

    #[test]
    fn test_uniform_matches_param_defaults() {
        let uniform = MaterialUniform::default();
        for param in FloatParam::ALL {
            assert_eq!(uniform.get(param), param.default_value());
        }
    }

    #[test]
    fn test_uniform_set_get() {
        let mut uniform = MaterialUniform::default();
        uniform.set(FloatParam::BlendAmount, 0.25);
        uniform.set(FloatParam::ParallaxMaxSamples, 40.0);
        assert_eq!(uniform.blend_amount, 0.25);
        assert_eq!(uniform.get(FloatParam::ParallaxMaxSamples), 40.0);
        let bytes = bytemuck::bytes_of(&uniform);
        assert_eq!(&bytes[0..4], &0.25f32.to_ne_bytes());
    }

    #[test]
    fn test_slot_bindings_follow_sampler() {
        assert_eq!(slot_binding(TextureSlot::Main), 2);
        assert_eq!(slot_binding(TextureSlot::BlendDepth), 5);
    }

    #[test]
    fn test_shader_sources_share_bindings() {
        for variant in [ShaderVariant::Clean, ShaderVariant::Parallax] {
            let src = shader_source(variant);
            assert!(src.contains("fn vs_impostor"));
            assert!(src.contains("fn fs_impostor"));
            assert!(src.contains("@group(1) @binding(5)"));
        }
        assert!(IMPOSTOR_PARALLAX_SHADER_SOURCE.contains("textureSampleLevel(main_depth"));
    }

    #[test]
    fn test_display_pipelines_build() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let layout = MaterialLayout::new(&device, &queue);
        for variant in [ShaderVariant::Clean, ShaderVariant::Parallax] {
            let pipeline = ImpostorPipeline::new(
                &device,
                &layout,
                variant,
                wgpu::TextureFormat::Bgra8UnormSrgb,
                Some(crate::pipeline::DEPTH_BUFFER_FORMAT),
            );
            assert_eq!(pipeline.variant, variant);
        }
    }
}
