//! Wandering herds of impostor-rendered animals on a `bevy_ecs` world.
//!
//! Insert the resources with [`insert_herd_resources`], spawn members
//! through a [`HerdSpawner`], and run [`herd_schedule`] once per frame
//! after advancing [`SimClock`].

mod components;
mod resources;
mod spawner;
mod systems;
mod wander;

pub use components::{
    AutoOrient, BillboardFacing, HerdMember, ImpostorSlot, Transform, Viewer, ViewerLink,
};
pub use resources::{
    Backend, Booth, CaptureBudget, Ground, HerdRng, Ledger, SimClock, insert_herd_resources,
};
pub use spawner::{HerdHandle, HerdSpawner};
pub use systems::{
    billboard_system, capture_pump_system, herd_schedule, impostor_tick_system,
    orientation_system, wander_system,
};
pub use wander::{WanderState, Wanderer};
