//! Octant impostors: a shared off-world capture booth renders each mesh from
//! eight compass directions, and each impostor shows the capture matching
//! the viewer's bearing.

mod backend;
mod billboard;
mod booth;
mod bounds;
mod entity;
mod error;
mod ground;
mod headless;
mod ledger;
mod material;
mod mesh;
mod orientation;
mod raster;
mod targets;

pub use backend::{
    BackendStats, CaptureCamera, InstanceId, MaterialId, MeshId, Placement, Projection,
    RenderBackend, RenderTargetDesc, TargetId, TargetKind, layer_mask,
};
pub use billboard::Billboard;
pub use booth::{
    BoothState, BoothStats, CameraOverrides, CaptureBooth, CaptureCallback, CaptureReport,
    CaptureRequest, CaptureTicket, DIRECTION_COUNT, MIN_CAMERA_DISTANCE,
};
pub use bounds::{AUTO_COLLIDER_DEPTH, Aabb, ColliderBox, collider_box, quad_scale};
pub use entity::{
    DisplayedView, ImpostorDebugInfo, ImpostorEntity, ImpostorSource, ReleaseSummary, TickInput,
};
pub use error::{BackendError, ImpostorError};
pub use ground::{FlatGround, GroundProbe, PROBE_DISTANCE, PROBE_START_HEIGHT, snap_to_ground};
pub use headless::{BackendEvent, HeadlessBackend};
pub use ledger::{ImpostorFootprint, ResourceLedger};
pub use material::{FloatParam, ShaderVariant, TextureSlot, parallax_params};
pub use mesh::{CUBOID_FACES, MeshData};
pub use orientation::{ALIGNMENT_THRESHOLD, CANDIDATE_OFFSETS, OrientationProbe, REQUIRED_SAMPLES};
pub use targets::{RenderTargetSet, depth_target_label, target_label};
