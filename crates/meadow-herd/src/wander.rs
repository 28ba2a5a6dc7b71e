//! Random wandering inside a rectangular zone.

use bevy_ecs::prelude::*;
use glam::{Quat, Vec2, Vec3};
use meadow_config::HerdConfig;
use rand::Rng;

/// Turning stops once the heading is this close to the destination.
const HEADING_TOLERANCE_DEG: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WanderState {
    /// Picking the next destination.
    Choosing,
    /// Turning on the spot toward `destination`.
    Turning { destination: Vec3 },
    /// Walking toward `destination`.
    Moving { destination: Vec3 },
    /// Standing still for `remaining` seconds.
    Waiting { remaining: f32 },
}

/// Wander AI for one herd member.
///
/// Cycles `Choosing -> Turning -> Moving -> Waiting -> Choosing`.
/// Heading is a yaw in degrees where 0 faces +Z and 90 faces +X.
#[derive(Component, Debug, Clone)]
pub struct Wanderer {
    state: WanderState,
    yaw_deg: f32,
    zone_center: Vec3,
    zone_size: Vec2,
    move_speed: f32,
    rotation_speed_deg: f32,
    wait_range: (f32, f32),
    arrival_tolerance: f32,
}

impl Wanderer {
    #[must_use]
    pub fn new(config: &HerdConfig, zone_center: Vec3, zone_size: Vec2, yaw_deg: f32) -> Self {
        Self {
            state: WanderState::Choosing,
            yaw_deg,
            zone_center,
            zone_size: zone_size.abs(),
            move_speed: config.move_speed.max(0.0),
            rotation_speed_deg: config.rotation_speed_deg.max(0.0),
            wait_range: config.wait_range(),
            arrival_tolerance: config.arrival_tolerance.max(0.0),
        }
    }

    /// Advance by `dt` seconds, moving `position` in place.
    pub fn update(&mut self, position: &mut Vec3, dt: f32, rng: &mut impl Rng) {
        let dt = dt.max(0.0);
        self.state = match self.state {
            WanderState::Choosing => WanderState::Turning {
                destination: self.pick_destination(position.y, rng),
            },
            WanderState::Turning { destination } => self.turn(*position, destination, dt, rng),
            WanderState::Moving { destination } => self.walk(position, destination, dt, rng),
            WanderState::Waiting { remaining } => {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    WanderState::Choosing
                } else {
                    WanderState::Waiting { remaining }
                }
            }
        };
    }

    fn pick_destination(&self, y: f32, rng: &mut impl Rng) -> Vec3 {
        let half = self.zone_size * 0.5;
        Vec3::new(
            self.zone_center.x + rng.gen_range(-half.x..=half.x),
            y,
            self.zone_center.z + rng.gen_range(-half.y..=half.y),
        )
    }

    fn start_waiting(&self, rng: &mut impl Rng) -> WanderState {
        let (lo, hi) = self.wait_range;
        WanderState::Waiting {
            remaining: rng.gen_range(lo..=hi),
        }
    }

    fn turn(&mut self, position: Vec3, destination: Vec3, dt: f32, rng: &mut impl Rng) -> WanderState {
        let Some(desired) = heading_to(position, destination, self.arrival_tolerance) else {
            return self.start_waiting(rng);
        };
        let diff = shortest_turn(self.yaw_deg, desired);
        let max_step = self.rotation_speed_deg * dt;
        if diff.abs() <= max_step {
            self.yaw_deg = desired;
        } else {
            self.yaw_deg = wrap_degrees(self.yaw_deg + max_step.copysign(diff));
        }
        if shortest_turn(self.yaw_deg, desired).abs() <= HEADING_TOLERANCE_DEG {
            WanderState::Moving { destination }
        } else {
            WanderState::Turning { destination }
        }
    }

    fn walk(
        &mut self,
        position: &mut Vec3,
        destination: Vec3,
        dt: f32,
        rng: &mut impl Rng,
    ) -> WanderState {
        let Some(desired) = heading_to(*position, destination, self.arrival_tolerance) else {
            return self.start_waiting(rng);
        };
        self.yaw_deg = desired;
        let mut offset = destination - *position;
        offset.y = 0.0;
        let distance = offset.length();
        let step = (self.move_speed * dt).min(distance);
        *position += offset / distance * step;
        if distance - step <= self.arrival_tolerance {
            self.start_waiting(rng)
        } else {
            WanderState::Moving { destination }
        }
    }

    /// Retarget to a new zone; the current walk is abandoned.
    pub fn set_zone(&mut self, center: Vec3, size: Vec2) {
        self.zone_center = center;
        self.zone_size = size.abs();
        self.state = WanderState::Choosing;
    }

    #[must_use]
    pub fn state(&self) -> WanderState {
        self.state
    }

    #[must_use]
    pub fn yaw_deg(&self) -> f32 {
        self.yaw_deg
    }

    #[must_use]
    pub fn facing(&self) -> Quat {
        Quat::from_rotation_y(self.yaw_deg.to_radians())
    }

    #[must_use]
    pub fn is_moving(&self) -> bool {
        matches!(self.state, WanderState::Moving { .. })
    }

    #[must_use]
    pub fn zone(&self) -> (Vec3, Vec2) {
        (self.zone_center, self.zone_size)
    }
}

/// Yaw toward `to`, or `None` when already within `tolerance`.
fn heading_to(from: Vec3, to: Vec3, tolerance: f32) -> Option<f32> {
    let dx = to.x - from.x;
    let dz = to.z - from.z;
    if (dx * dx + dz * dz).sqrt() <= tolerance.max(1e-4) {
        return None;
    }
    Some(wrap_degrees(dx.atan2(dz).to_degrees()))
}

fn wrap_degrees(deg: f32) -> f32 {
    deg.rem_euclid(360.0)
}

/// Signed turn in `(-180, 180]` from `from` to `to`.
fn shortest_turn(from: f32, to: f32) -> f32 {
    let d = (to - from).rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}
