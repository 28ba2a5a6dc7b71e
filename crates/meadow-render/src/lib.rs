//! GPU backend for meadow impostors on `wgpu`: capture pipelines, render
//! targets, and the material bindings the impostor shaders read.

mod backend;
mod context;
mod material;
mod pipeline;
mod vertex;

pub use backend::GpuBackend;
pub use context::{GpuContext, GpuError};
pub use material::{
    IMPOSTOR_CLEAN_SHADER_SOURCE, IMPOSTOR_PARALLAX_SHADER_SOURCE, ImpostorPipeline,
    MaterialLayout, MaterialUniform, shader_source, slot_binding,
};
pub use pipeline::{
    CAPTURE_SHADER_SOURCE, COLOR_FORMAT, CapturePipeline, DEPTH_BUFFER_FORMAT,
    DEPTH_TARGET_FORMAT,
};
pub use vertex::{
    CaptureVertex, DrawUniform, ImpostorCameraUniform, ImpostorVertex, QUAD_INDICES, impostor_quad,
};
