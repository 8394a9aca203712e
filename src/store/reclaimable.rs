//! Child map for reclaimable trie hops.
//!
//! Entries are keyed by anchor address and hold only a [`WeakAnchor`]. Once
//! the last strong reference to an anchor is dropped the entry is dead: it is
//! never returned again and is removed by the next sweep. Sweeps run
//! opportunistically when a new key arrives and the map has grown to twice
//! the population that survived the previous sweep, keeping the amortised
//! cost per insert O(1) while small maps (such as the generation level) drop
//! dead entries almost immediately.

use rustc_hash::FxHashMap;

use crate::key::{Anchor, WeakAnchor};

const MIN_SWEEP_THRESHOLD: usize = 1;

#[derive(Debug)]
struct Entry<N> {
    anchor: WeakAnchor,
    node: N,
}

#[derive(Debug)]
pub(crate) struct ReclaimableChildren<N> {
    entries: FxHashMap<usize, Entry<N>>,
    sweep_at: usize,
}

impl<N> ReclaimableChildren<N> {
    pub(crate) fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            sweep_at: MIN_SWEEP_THRESHOLD,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get_mut(&mut self, anchor: &Anchor) -> Option<&mut N> {
        let id = anchor.id();
        let alive = self.entries.get(&id)?.anchor.is_alive();
        if !alive {
            self.entries.remove(&id);
            return None;
        }
        self.entries.get_mut(&id).map(|entry| &mut entry.node)
    }

    /// Returns the child for `anchor`, creating it with `make` if missing.
    ///
    /// `reclaimed` is incremented by the number of dead entries dropped if
    /// this insert triggers a sweep.
    pub(crate) fn get_or_insert_with(
        &mut self,
        anchor: &Anchor,
        make: impl FnOnce() -> N,
        reclaimed: &mut u64,
    ) -> &mut N {
        let id = anchor.id();
        if !self.entries.contains_key(&id) && self.entries.len() >= self.sweep_at {
            *reclaimed += self.sweep() as u64;
        }
        &mut self
            .entries
            .entry(id)
            .or_insert_with(|| Entry {
                anchor: anchor.downgrade(),
                node: make(),
            })
            .node
    }

    /// Drops dead entries and recomputes the sweep threshold.
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.anchor.is_alive());
        let dropped = before - self.entries.len();
        self.sweep_at = (self.entries.len() * 2).max(MIN_SWEEP_THRESHOLD);
        if dropped > 0 {
            tracing::debug!(dropped, remaining = self.entries.len(), "swept dead reclaimable keys");
        }
        dropped
    }

    /// Drops dead entries, then live entries for which `keep` returns `false`.
    /// Returns the number of dead entries dropped.
    pub(crate) fn purge(&mut self, mut keep: impl FnMut(&mut N) -> bool) -> usize {
        let dropped = self.sweep();
        self.entries.retain(|_, entry| keep(&mut entry.node));
        dropped
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn live_anchor_finds_its_child() {
        let mut children = ReclaimableChildren::new();
        let anchor = Anchor::new();
        let mut reclaimed = 0;
        *children.get_or_insert_with(&anchor, || 1, &mut reclaimed) += 1;
        assert_eq!(children.get_mut(&anchor), Some(&mut 2));
        assert_eq!(children.get_mut(&Anchor::new()), None);
        assert_eq!(reclaimed, 0);
    }

    #[test]
    fn sweep_drops_dead_entries() {
        let mut children = ReclaimableChildren::new();
        let keep = Arc::new(1u8);
        let drop_me = Arc::new(2u8);
        let mut reclaimed = 0;
        children.get_or_insert_with(&Anchor::of(&keep), || "keep", &mut reclaimed);
        children.get_or_insert_with(&Anchor::of(&drop_me), || "drop", &mut reclaimed);
        drop(drop_me);

        assert_eq!(children.sweep(), 1);
        assert_eq!(children.len(), 1);
        assert_eq!(children.get_mut(&Anchor::of(&keep)), Some(&mut "keep"));
    }

    #[test]
    fn new_keys_trigger_opportunistic_sweep() {
        let mut children = ReclaimableChildren::new();
        let mut reclaimed = 0;
        for _ in 0..8 {
            // Each temporary anchor dies right after insertion.
            children.get_or_insert_with(&Anchor::new(), || (), &mut reclaimed);
        }
        assert_eq!(reclaimed, 7);
        assert_eq!(children.len(), 1);

        let survivor = Anchor::new();
        children.get_or_insert_with(&survivor, || (), &mut reclaimed);
        assert_eq!(reclaimed, 8);
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn live_population_doubles_threshold() {
        let mut children = ReclaimableChildren::new();
        let anchors: Vec<Anchor> = (0..16).map(|_| Anchor::new()).collect();
        let mut reclaimed = 0;
        for anchor in &anchors {
            children.get_or_insert_with(anchor, || (), &mut reclaimed);
        }
        assert_eq!(reclaimed, 0);
        assert_eq!(children.len(), 16);
    }

    #[test]
    fn purge_applies_keep_to_live_entries() {
        let mut children = ReclaimableChildren::new();
        let a = Anchor::new();
        let b = Anchor::new();
        let mut reclaimed = 0;
        children.get_or_insert_with(&a, || 0, &mut reclaimed);
        children.get_or_insert_with(&b, || 1, &mut reclaimed);

        assert_eq!(children.purge(|n| *n == 1), 0);
        assert!(children.get_mut(&a).is_none());
        assert!(children.get_mut(&b).is_some());
        assert!(!children.is_empty());
    }
}
