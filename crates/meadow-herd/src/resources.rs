use bevy_ecs::prelude::*;
use meadow_config::BoothConfig;
use meadow_impostor::{CaptureBooth, GroundProbe, RenderBackend, ResourceLedger};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

/// The shared capture booth.
#[derive(Resource)]
pub struct Booth(pub CaptureBooth);

/// The renderer every impostor allocates from.
#[derive(Resource)]
pub struct Backend(pub Box<dyn RenderBackend + Send + Sync>);

/// Optional ground for spawn snapping.
#[derive(Resource)]
pub struct Ground(pub Box<dyn GroundProbe + Send + Sync>);

/// Expected backend resource totals for the live herd.
#[derive(Resource, Debug, Default)]
pub struct Ledger(pub ResourceLedger);

/// Captures the booth may serve per frame when it does not drain on submit.
#[derive(Resource, Debug, Clone, Copy)]
pub struct CaptureBudget(pub usize);

impl Default for CaptureBudget {
    fn default() -> Self {
        Self(4)
    }
}

/// Simulation time, advanced by the caller once per frame.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimClock {
    /// Seconds since start.
    pub now: f64,
    /// Seconds covered by the current frame.
    pub delta: f32,
}

impl SimClock {
    pub fn advance(&mut self, dt: f32) {
        self.delta = dt.max(0.0);
        self.now += f64::from(self.delta);
    }
}

/// Seeded RNG shared by the wander AI and the spawner.
#[derive(Resource, Debug, Clone)]
pub struct HerdRng(pub Xoshiro256StarStar);

impl HerdRng {
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(Xoshiro256StarStar::seed_from_u64(seed))
    }
}

/// Inserts everything the herd systems and spawner need.
pub fn insert_herd_resources(
    world: &mut World,
    booth: BoothConfig,
    backend: Box<dyn RenderBackend + Send + Sync>,
    seed: u64,
) {
    world.insert_resource(Booth(CaptureBooth::new(booth)));
    world.insert_resource(Backend(backend));
    world.insert_resource(Ledger::default());
    world.insert_resource(CaptureBudget::default());
    world.insert_resource(SimClock::default());
    world.insert_resource(HerdRng::seeded(seed));
}
