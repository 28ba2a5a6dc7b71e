//! Error types for the impostor pipeline.

use crate::backend::{InstanceId, MaterialId, MeshId, TargetId, TargetKind};

/// Failures reported by a [`RenderBackend`](crate::RenderBackend).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("unknown mesh {0}")]
    UnknownMesh(MeshId),

    #[error("unknown mesh instance {0}")]
    UnknownInstance(InstanceId),

    #[error("unknown render target {0}")]
    UnknownTarget(TargetId),

    #[error("unknown material {0}")]
    UnknownMaterial(MaterialId),

    /// A color target was supplied where a depth target was expected, or
    /// the other way round.
    #[error("render target {target} is not a {expected:?} target")]
    WrongTargetKind { target: TargetId, expected: TargetKind },

    #[error("invalid render target size {0}")]
    InvalidTargetSize(u32),

    /// Color and depth targets of one render must share a size.
    #[error("render target sizes differ: {color} vs {depth}")]
    SizeMismatch { color: u32, depth: u32 },

    /// Device-level failure (allocation, submission, lost device).
    #[error("device error: {0}")]
    Device(String),
}

/// Errors raised while creating or driving impostors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ImpostorError {
    /// The entity has no mesh to capture.
    #[error("impostor '{entity}' has no mesh source")]
    MissingMeshSource { entity: String },

    /// A capture request carried the wrong number of color targets.
    #[error("capture needs {expected} render targets, got {actual}")]
    TargetCountMismatch { expected: usize, actual: usize },

    /// A capture request carried the wrong number of depth targets.
    #[error("capture needs {expected} depth targets, got {actual}")]
    DepthTargetCountMismatch { expected: usize, actual: usize },

    /// The mesh instance named by a request does not exist.
    #[error("capture instance {0} does not exist")]
    UnknownInstance(InstanceId),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
