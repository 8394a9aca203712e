//! Key-chain store: a trie addressed by a sequence of [`Key`]s.
//!
//! ## Architecture
//!
//! ```text
//!   chain [g, 1, obj, "x"]  ──partition──►  reclaimable [g, obj]   durable [1, "x"]
//!
//!   root
//!    └─ reclaimable[g]                 (ReclaimableChildren: weak, swept)
//!        └─ reclaimable[obj]
//!            └─ durable[1]             (InsertionMap: bounded by `limit`)
//!                └─ durable["x"]  ─►  stored value
//! ```
//!
//! Reclaimable keys are always walked first, in their original relative
//! order, followed by the durable keys. Chains that differ only in how the
//! two classes interleave therefore address the same entry.
//!
//! ## Eviction
//!
//! A durable child map holding `limit` keys evicts its oldest-inserted key
//! before accepting a new one and marks its parent node overflowed. Reads
//! through an overflowed node move the traversed key to the newest position,
//! so recently read entries survive the next eviction. Before the first
//! eviction no reordering happens: the bound is approximate, not LRU.
//!
//! ## Example Usage
//!
//! ```
//! use std::num::NonZeroUsize;
//!
//! use memokit::key::{Anchor, Key};
//! use memokit::store::{KeyChainStore, WriteOptions};
//!
//! let owner = Anchor::new();
//! let mut store = KeyChainStore::new();
//! let options = WriteOptions::default().with_limit(NonZeroUsize::new(8));
//!
//! store.set(&[Key::from(owner.clone()), Key::from(1u8)], "one", options).unwrap();
//! assert_eq!(store.get(&[Key::from(owner), Key::from(1u8)]), Some(&"one"));
//! ```

use std::fmt;
use std::num::NonZeroUsize;

use crate::ds::InsertionMap;
use crate::error::CacheError;
use crate::key::{Key, Value};
use crate::store::reclaimable::ReclaimableChildren;

/// Write options for [`KeyChainStore::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Capacity of every durable child map touched by the write.
    pub limit: Option<NonZeroUsize>,
    /// Accept chains without any reclaimable key.
    pub allow_durable_only: bool,
}

impl WriteOptions {
    pub fn with_limit(mut self, limit: Option<NonZeroUsize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn allow_durable_only(mut self, allow: bool) -> Self {
        self.allow_durable_only = allow;
        self
    }
}

/// Counters describing the store's maintenance activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Durable keys dropped by the `limit` bound.
    pub evictions: u64,
    /// Dead reclaimable entries dropped by sweeps and purges.
    pub reclaimed: u64,
}

struct TrieNode<V> {
    stored: Option<V>,
    reclaimable: Option<ReclaimableChildren<TrieNode<V>>>,
    durable: Option<InsertionMap<Value, TrieNode<V>>>,
    overflowed: bool,
}

impl<V> TrieNode<V> {
    fn new() -> Self {
        Self {
            stored: None,
            reclaimable: None,
            durable: None,
            overflowed: false,
        }
    }

    fn is_vacant(&self) -> bool {
        self.stored.is_none() && self.reclaimable.is_none() && self.durable.is_none()
    }

    /// Drops dead reclaimable branches and vacant children below this node.
    fn purge(&mut self) -> usize {
        let mut reclaimed = 0;
        if let Some(children) = self.reclaimable.as_mut() {
            let dead = children.purge(|child| {
                reclaimed_below(child, &mut reclaimed);
                !child.is_vacant()
            });
            reclaimed += dead;
            if children.is_empty() {
                self.reclaimable = None;
            }
        }
        if let Some(children) = self.durable.as_mut() {
            children.retain(|_, child| {
                reclaimed_below(child, &mut reclaimed);
                !child.is_vacant()
            });
            if children.is_empty() {
                self.durable = None;
            }
        }
        reclaimed
    }
}

fn reclaimed_below<V>(child: &mut TrieNode<V>, total: &mut usize) {
    *total += child.purge();
}

/// Trie keyed by key chains, see the [module docs](self).
pub struct KeyChainStore<V> {
    root: TrieNode<V>,
    stats: StoreStats,
}

impl<V> KeyChainStore<V> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(),
            stats: StoreStats::default(),
        }
    }

    /// Looks up the value stored under exactly `chain`.
    ///
    /// Takes `&mut self` because a hop through an overflowed durable map
    /// reorders that map, and dead reclaimable entries met on the way are
    /// pruned.
    pub fn get(&mut self, chain: &[Key]) -> Option<&V> {
        let mut node = &mut self.root;
        for anchor in chain.iter().filter_map(Key::as_anchor) {
            node = node.reclaimable.as_mut()?.get_mut(anchor)?;
        }
        for value in chain.iter().filter_map(Key::as_value) {
            let overflowed = node.overflowed;
            let children = node.durable.as_mut()?;
            if overflowed {
                children.touch(value);
            }
            node = children.get_mut(value)?;
        }
        node.stored.as_ref()
    }

    /// Stores `value` under `chain`, creating intermediate nodes as needed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::MissingReclaimableKey`] when `chain` has no
    /// reclaimable key and `options.allow_durable_only` is not set. Nothing
    /// is written in that case.
    pub fn set(&mut self, chain: &[Key], value: V, options: WriteOptions) -> Result<&V, CacheError> {
        if !options.allow_durable_only && !chain.iter().any(Key::is_reclaimable) {
            return Err(CacheError::MissingReclaimableKey { durable: chain.len() });
        }

        let stats = &mut self.stats;
        let mut node = &mut self.root;
        for anchor in chain.iter().filter_map(Key::as_anchor) {
            node = node
                .reclaimable
                .get_or_insert_with(ReclaimableChildren::new)
                .get_or_insert_with(anchor, TrieNode::new, &mut stats.reclaimed);
        }
        for durable in chain.iter().filter_map(Key::as_value) {
            let children = node.durable.get_or_insert_with(InsertionMap::new);
            if !children.contains_key(durable) {
                if let Some(limit) = options.limit
                    && children.len() >= limit.get()
                    && let Some((evicted, _)) = children.pop_oldest()
                {
                    node.overflowed = true;
                    stats.evictions += 1;
                    tracing::debug!(%evicted, limit = limit.get(), "durable key evicted");
                }
            }
            node = children.get_or_insert_with(durable, TrieNode::new);
        }
        Ok(&*node.stored.insert(value))
    }

    /// Returns the value under `chain`, storing `make()` there first if absent.
    pub fn get_or_insert_with(
        &mut self,
        chain: &[Key],
        options: WriteOptions,
        make: impl FnOnce() -> V,
    ) -> Result<V, CacheError>
    where
        V: Clone,
    {
        if let Some(found) = self.get(chain) {
            return Ok(found.clone());
        }
        self.set(chain, make(), options).cloned()
    }

    /// Sweeps dead reclaimable branches and prunes vacant nodes.
    ///
    /// Returns the number of dead reclaimable entries dropped.
    pub fn purge(&mut self) -> usize {
        let reclaimed = self.root.purge();
        self.stats.reclaimed += reclaimed as u64;
        reclaimed
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// `true` if nothing is stored, not even unreachable entries.
    pub fn is_empty(&self) -> bool {
        self.root.is_vacant()
    }

    pub fn clear(&mut self) {
        self.root = TrieNode::new();
    }
}

impl<V> Default for KeyChainStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for KeyChainStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChainStore")
            .field("empty", &self.is_empty())
            .field("stats", &self.stats)
            .finish()
    }
}
