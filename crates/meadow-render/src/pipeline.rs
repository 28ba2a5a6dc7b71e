//! Unlit pipelines that render booth meshes into impostor targets.

use std::num::NonZeroU64;

use crate::vertex::CaptureVertex;

/// WGSL source for the capture shader.
pub const CAPTURE_SHADER_SOURCE: &str = include_str!("shaders/capture.wgsl");

/// Format of impostor color targets.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Format of impostor depth targets; sampled as a filterable float texture.
pub const DEPTH_TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;
/// Format of the z-buffer used while capturing.
pub const DEPTH_BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Capture pipelines: one writes color only, the other also writes linear
/// depth into a second attachment.
pub struct CapturePipeline {
    pub color_only: wgpu::RenderPipeline,
    pub color_depth: wgpu::RenderPipeline,
    pub draw_bind_group_layout: wgpu::BindGroupLayout,
}

impl CapturePipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("capture-shader"),
            source: wgpu::ShaderSource::Wgsl(CAPTURE_SHADER_SOURCE.into()),
        });

        let draw_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("capture-draw-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(64), // mat4x4<f32>
                    },
                    count: None,
                }],
            });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("capture-pipeline-layout"),
            bind_group_layouts: &[&draw_bind_group_layout],
            immediate_size: 0,
        });

        let color_target = Some(wgpu::ColorTargetState {
            format: COLOR_FORMAT,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        });
        let depth_target = Some(wgpu::ColorTargetState {
            format: DEPTH_TARGET_FORMAT,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        });

        let color_only = build(
            device,
            &layout,
            &shader,
            "capture-color-pipeline",
            "fs_color",
            &[color_target.clone()],
        );
        let color_depth = build(
            device,
            &layout,
            &shader,
            "capture-color-depth-pipeline",
            "fs_color_depth",
            &[color_target, depth_target],
        );

        Self {
            color_only,
            color_depth,
            draw_bind_group_layout,
        }
    }
}

fn build(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    label: &str,
    fragment_entry: &str,
    targets: &[Option<wgpu::ColorTargetState>],
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[CaptureVertex::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Booth meshes are captured from all sides.
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_BUFFER_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}
