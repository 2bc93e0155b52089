//! Per-observer visibility tracking.
//!
//! An observer tracks the entities within its view distance (in chunks,
//! Chebyshev metric). Entities entering the set get a full snapshot, entities
//! staying in it get deltas, entities leaving it are untracked.

use entsync_core::EntityId;
use std::collections::{BTreeMap, BTreeSet};

/// Chunk column coordinates.
pub type ChunkPos = (i32, i32);

/// Result of a visibility update, each list ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityChange {
    /// Newly visible; need a snapshot.
    pub entered: Vec<EntityId>,
    /// Still visible; need deltas.
    pub retained: Vec<EntityId>,
    /// No longer visible; need an untrack.
    pub left: Vec<EntityId>,
}

/// Entities one observer currently tracks.
///
/// Uses `BTreeSet` so message order is deterministic.
#[derive(Debug, Clone)]
pub struct ObserverTracker {
    visible: BTreeSet<EntityId>,
    view_distance: u32,
}

/// Chebyshev distance between two chunk columns.
pub fn chunk_distance(a: ChunkPos, b: ChunkPos) -> u32 {
    let dx = (a.0 as i64 - b.0 as i64).unsigned_abs();
    let dz = (a.1 as i64 - b.1 as i64).unsigned_abs();
    dx.max(dz).min(u32::MAX as u64) as u32
}

impl ObserverTracker {
    /// Tracker with nothing visible yet.
    pub fn new(view_distance: u32) -> Self {
        Self {
            visible: BTreeSet::new(),
            view_distance,
        }
    }

    /// View distance in chunks.
    pub fn view_distance(&self) -> u32 {
        self.view_distance
    }

    /// Recompute the visible set for an observer standing in `observer`.
    pub fn update_visibility(
        &mut self,
        observer: ChunkPos,
        entities: &BTreeMap<EntityId, ChunkPos>,
    ) -> VisibilityChange {
        let now_visible: BTreeSet<EntityId> = entities
            .iter()
            .filter(|(_, chunk)| chunk_distance(observer, **chunk) <= self.view_distance)
            .map(|(id, _)| *id)
            .collect();

        let change = VisibilityChange {
            entered: now_visible.difference(&self.visible).copied().collect(),
            retained: now_visible.intersection(&self.visible).copied().collect(),
            left: self.visible.difference(&now_visible).copied().collect(),
        };
        self.visible = now_visible;
        change
    }

    /// Whether `entity` is currently tracked.
    pub fn is_tracking(&self, entity: EntityId) -> bool {
        self.visible.contains(&entity)
    }

    /// Number of tracked entities.
    pub fn tracked_count(&self) -> usize {
        self.visible.len()
    }

    /// Stop tracking everything, returning what was tracked.
    pub fn clear(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.visible).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(entries: &[(EntityId, ChunkPos)]) -> BTreeMap<EntityId, ChunkPos> {
        entries.iter().copied().collect()
    }

    #[test]
    fn visibility_within_range() {
        let mut tracker = ObserverTracker::new(2);
        let change = tracker.update_visibility(
            (0, 0),
            &positions(&[(1, (0, 0)), (2, (2, -2)), (3, (3, 0))]),
        );
        assert_eq!(change.entered, vec![1, 2]);
        assert!(change.retained.is_empty());
        assert!(tracker.is_tracking(2));
        assert!(!tracker.is_tracking(3));
    }

    #[test]
    fn entities_move_between_sets() {
        let mut tracker = ObserverTracker::new(1);
        tracker.update_visibility((0, 0), &positions(&[(1, (0, 0)), (2, (1, 1))]));
        let change = tracker.update_visibility(
            (0, 0),
            &positions(&[(1, (0, 0)), (2, (5, 5)), (3, (0, 1))]),
        );
        assert_eq!(
            change,
            VisibilityChange {
                entered: vec![3],
                retained: vec![1],
                left: vec![2],
            }
        );
    }

    #[test]
    fn despawned_entities_leave() {
        let mut tracker = ObserverTracker::new(4);
        tracker.update_visibility((0, 0), &positions(&[(1, (0, 0))]));
        let change = tracker.update_visibility((0, 0), &BTreeMap::new());
        assert_eq!(change.left, vec![1]);
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn distance_does_not_overflow() {
        assert_eq!(chunk_distance((i32::MIN, 0), (i32::MAX, 0)), u32::MAX);
        assert_eq!(chunk_distance((-3, 4), (1, 1)), 4);
    }

    #[test]
    fn clear_returns_tracked() {
        let mut tracker = ObserverTracker::new(4);
        tracker.update_visibility((0, 0), &positions(&[(5, (0, 0)), (2, (1, 0))]));
        assert_eq!(tracker.clear(), vec![2, 5]);
        assert_eq!(tracker.tracked_count(), 0);
    }
}
