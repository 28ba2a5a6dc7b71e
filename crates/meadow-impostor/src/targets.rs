//! Per-entity render target sets.

use meadow_octant::{OCTANT_COUNT, Octant};
use tracing::warn;

use crate::backend::{RenderBackend, RenderTargetDesc, TargetId};
use crate::error::BackendError;

/// `{entity}_{Compass}` label for the color target of one direction.
#[must_use]
pub fn target_label(entity: &str, octant: Octant) -> String {
    format!("{entity}_{}", octant.name())
}

/// Label of the paired depth target.
#[must_use]
pub fn depth_target_label(entity: &str, octant: Octant) -> String {
    format!("{entity}_{}_Depth", octant.name())
}

/// Eight color targets, one per octant, plus eight paired depth targets
/// when parallax is enabled.
///
/// A set is either complete or does not exist: creation releases whatever
/// it already allocated when a later allocation fails. The set is not
/// `Clone`, and [`release`](Self::release) consumes it, so a target can
/// only be released once by its owner.
#[derive(Debug)]
pub struct RenderTargetSet {
    size: u32,
    color: [TargetId; OCTANT_COUNT],
    depth: Option<[TargetId; OCTANT_COUNT]>,
}

impl RenderTargetSet {
    pub fn create(
        backend: &mut dyn RenderBackend,
        entity: &str,
        size: u32,
        with_depth: bool,
    ) -> Result<Self, BackendError> {
        let mut created: Vec<TargetId> = Vec::with_capacity(OCTANT_COUNT * 2);

        let mut descs: Vec<RenderTargetDesc> = Octant::ALL
            .iter()
            .map(|&o| RenderTargetDesc::color(target_label(entity, o), size))
            .collect();
        if with_depth {
            descs.extend(
                Octant::ALL
                    .iter()
                    .map(|&o| RenderTargetDesc::depth(depth_target_label(entity, o), size)),
            );
        }

        for desc in &descs {
            match backend.create_render_target(desc) {
                Ok(id) => created.push(id),
                Err(err) => {
                    warn!(entity, label = %desc.label, %err, "render target allocation failed; rolling back");
                    for id in created {
                        backend.release_render_target(id);
                    }
                    return Err(err);
                }
            }
        }

        let color = std::array::from_fn(|i| created[i]);
        let depth = with_depth.then(|| std::array::from_fn(|i| created[OCTANT_COUNT + i]));
        Ok(Self { size, color, depth })
    }

    #[must_use]
    pub fn color(&self) -> &[TargetId; OCTANT_COUNT] {
        &self.color
    }

    #[must_use]
    pub fn depth(&self) -> Option<&[TargetId; OCTANT_COUNT]> {
        self.depth.as_ref()
    }

    #[must_use]
    pub fn color_for(&self, octant: Octant) -> TargetId {
        self.color[octant.index()]
    }

    #[must_use]
    pub fn depth_for(&self, octant: Octant) -> Option<TargetId> {
        self.depth.map(|d| d[octant.index()])
    }

    #[must_use]
    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// Edge length of every target in the set.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Total number of targets held (8 or 16).
    #[must_use]
    pub fn target_count(&self) -> usize {
        if self.has_depth() {
            OCTANT_COUNT * 2
        } else {
            OCTANT_COUNT
        }
    }

    /// Releases every target and returns how many the backend freed.
    pub fn release(self, backend: &mut dyn RenderBackend) -> usize {
        self.color
            .iter()
            .chain(self.depth.iter().flatten())
            .filter(|&&id| backend.release_render_target(id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TargetKind;
    use crate::headless::HeadlessBackend;

    #[test]
    fn test_color_only_set() {
        let mut backend = HeadlessBackend::new();
        let set = RenderTargetSet::create(&mut backend, "Cow_3", 32, false).unwrap();
        assert_eq!(set.target_count(), 8);
        assert!(!set.has_depth());
        assert_eq!(set.depth_for(Octant::North), None);
        assert_eq!(backend.target_label(set.color_for(Octant::South)), Some("Cow_3_South"));
        assert_eq!(backend.stats().target_bytes, 8 * 32 * 32 * TargetKind::Color.bytes_per_texel());
        assert_eq!(set.release(&mut backend), 8);
        assert_eq!(backend.stats().live_targets, 0);
    }

    #[test]
    fn test_depth_targets_are_paired() {
        let mut backend = HeadlessBackend::new();
        let set = RenderTargetSet::create(&mut backend, "Cow", 8, true).unwrap();
        assert_eq!(set.target_count(), 16);
        for octant in Octant::ALL {
            let depth = set.depth_for(octant).unwrap();
            assert_eq!(
                backend.target_label(depth).map(str::to_string),
                Some(depth_target_label("Cow", octant))
            );
        }
        assert_eq!(set.release(&mut backend), 16);
    }

    #[test]
    fn test_failed_allocation_releases_partial_set() {
        let mut backend = HeadlessBackend::new().with_target_limit(10);
        let result = RenderTargetSet::create(&mut backend, "Cow", 8, true);
        assert!(matches!(result, Err(BackendError::Device(_))));
        let stats = backend.stats();
        assert_eq!(stats.live_targets, 0);
        assert_eq!(stats.target_bytes, 0);
    }
}
