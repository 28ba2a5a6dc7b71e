//! Running totals of the backend resources owned by live impostors.

use rustc_hash::FxHashMap;

use crate::backend::{BackendStats, TargetKind};

/// Resources one impostor holds while alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpostorFootprint {
    pub targets: usize,
    pub target_bytes: u64,
    pub materials: usize,
    pub instances: usize,
}

impl ImpostorFootprint {
    /// Eight color targets of `size`², plus eight depth targets with
    /// parallax, one material and one mesh clone.
    #[must_use]
    pub fn for_entity(size: u32, parallax: bool) -> Self {
        let texels = u64::from(size) * u64::from(size) * 8;
        let mut target_bytes = texels * TargetKind::Color.bytes_per_texel();
        if parallax {
            target_bytes += texels * TargetKind::Depth.bytes_per_texel();
        }
        Self {
            targets: if parallax { 16 } else { 8 },
            target_bytes,
            materials: 1,
            instances: 1,
        }
    }
}

/// Tracks the footprint of every live impostor keyed by the caller's id.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    footprints: FxHashMap<u64, ImpostorFootprint>,
    targets: usize,
    target_bytes: u64,
    materials: usize,
    instances: usize,
}

impl ResourceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a spawned impostor. Re-recording a key replaces its footprint.
    pub fn on_spawned(&mut self, key: u64, footprint: ImpostorFootprint) {
        if let Some(old) = self.footprints.insert(key, footprint) {
            self.subtract(old);
        }
        self.targets += footprint.targets;
        self.target_bytes += footprint.target_bytes;
        self.materials += footprint.materials;
        self.instances += footprint.instances;
    }

    /// Record a destroyed impostor. Unknown keys are ignored.
    pub fn on_destroyed(&mut self, key: u64) {
        if let Some(old) = self.footprints.remove(&key) {
            self.subtract(old);
        }
    }

    fn subtract(&mut self, f: ImpostorFootprint) {
        self.targets -= f.targets;
        self.target_bytes -= f.target_bytes;
        self.materials -= f.materials;
        self.instances -= f.instances;
    }

    #[must_use]
    pub fn live_entities(&self) -> usize {
        self.footprints.len()
    }

    #[must_use]
    pub fn total_targets(&self) -> usize {
        self.targets
    }

    #[must_use]
    pub fn total_target_bytes(&self) -> u64 {
        self.target_bytes
    }

    #[must_use]
    pub fn total_materials(&self) -> usize {
        self.materials
    }

    #[must_use]
    pub fn total_instances(&self) -> usize {
        self.instances
    }

    /// True when the backend holds exactly what the ledger expects.
    #[must_use]
    pub fn matches(&self, stats: &BackendStats) -> bool {
        stats.live_targets == self.targets
            && stats.target_bytes == self.target_bytes
            && stats.live_materials == self.materials
            && stats.live_instances == self.instances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprint_sizes() {
        let clean = ImpostorFootprint::for_entity(256, false);
        assert_eq!(clean.targets, 8);
        assert_eq!(clean.target_bytes, 8 * 256 * 256 * 4);
        let parallax = ImpostorFootprint::for_entity(256, true);
        assert_eq!(parallax.targets, 16);
        assert_eq!(parallax.target_bytes, 8 * 256 * 256 * 6);
    }

    #[test]
    fn test_spawn_and_destroy_totals() {
        let mut ledger = ResourceLedger::new();
        for key in 0..4 {
            ledger.on_spawned(key, ImpostorFootprint::for_entity(64, true));
        }
        assert_eq!(ledger.live_entities(), 4);
        assert_eq!(ledger.total_targets(), 64);
        assert_eq!(ledger.total_materials(), 4);

        ledger.on_destroyed(2);
        ledger.on_destroyed(2);
        assert_eq!(ledger.total_targets(), 48);
        for key in [0, 1, 3] {
            ledger.on_destroyed(key);
        }
        assert_eq!(ledger.total_targets(), 0);
        assert_eq!(ledger.total_target_bytes(), 0);
        assert_eq!(ledger.live_entities(), 0);
    }

    #[test]
    fn test_respawn_replaces_footprint() {
        let mut ledger = ResourceLedger::new();
        ledger.on_spawned(7, ImpostorFootprint::for_entity(32, true));
        ledger.on_spawned(7, ImpostorFootprint::for_entity(32, false));
        assert_eq!(ledger.total_targets(), 8);
        assert_eq!(ledger.total_instances(), 1);
    }

    #[test]
    fn test_matches_backend_stats() {
        let mut ledger = ResourceLedger::new();
        ledger.on_spawned(1, ImpostorFootprint::for_entity(16, false));
        let stats = BackendStats {
            live_targets: 8,
            live_materials: 1,
            live_instances: 1,
            target_bytes: 8 * 16 * 16 * 4,
            renders: 99,
        };
        assert!(ledger.matches(&stats));
        assert!(!ledger.matches(&BackendStats::default()));
    }
}
