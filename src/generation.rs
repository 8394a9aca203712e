//! Process-wide generation marker.
//!
//! Every key chain built by a memoizer starts with the current marker. A
//! [`reset`] swaps in a fresh marker: new lookups can no longer reach any
//! branch keyed under the old one, and since the old marker loses its last
//! strong reference those branches become dead and are swept like any other
//! reclaimable entry. No store is walked.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::key::Anchor;

static MARKER: LazyLock<RwLock<Anchor>> = LazyLock::new(|| RwLock::new(Anchor::new()));
static RESETS: AtomicU64 = AtomicU64::new(0);

/// Selector used by memoizers without a custom resolver.
static DEFAULT_SELECTOR: LazyLock<Anchor> = LazyLock::new(Anchor::new);

/// Current generation marker.
pub fn generation() -> Anchor {
    MARKER.read().clone()
}

/// Invalidates every memoized entry in every store, in O(1).
///
/// Values already handed out are unaffected; the next call with the same
/// arguments recomputes.
pub fn reset() {
    let mut marker = MARKER.write();
    *marker = Anchor::new();
    let resets = RESETS.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::debug!(resets, "cache generation reset");
}

/// Number of resets performed by this process.
pub fn reset_count() -> u64 {
    RESETS.load(Ordering::Relaxed)
}

pub(crate) fn default_selector() -> Anchor {
    DEFAULT_SELECTOR.clone()
}
