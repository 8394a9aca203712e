//! Insertion-ordered hash map with O(1) reinsertion.
//!
//! Backs the durable-key level of the key-chain store, where eviction drops
//! the oldest-inserted key and a "recency touch" is modelled as
//! remove-then-reinsert (the key moves to the newest position).
//!
//! ## Architecture
//!
//! ```text
//!   index: FxHashMap<K, SlotId>        links: SlotArena<Link<K, V>>
//!   ┌─────────┬─────────┐              oldest ─► [A] ◄──► [B] ◄──► [C] ◄── newest
//!   │  key A  │  id_1   │
//!   │  key B  │  id_2   │
//!   └─────────┴─────────┘
//! ```
//!
//! ## Operations
//! - `insert(k, v)`: new keys go to the newest end; existing keys keep their place
//! - `touch(k)`: moves `k` to the newest end
//! - `pop_oldest()`: removes from the oldest end
//! - `retain(f)`: drops entries in place, preserving order
//!
//! All operations except `retain` and iteration are O(1) average.
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ds::slot_arena::{SlotArena, SlotId};

#[derive(Debug)]
struct Link<K, V> {
    key: K,
    value: V,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// Hash map that remembers insertion order and can move keys to the back.
#[derive(Debug)]
pub struct InsertionMap<K, V> {
    index: FxHashMap<K, SlotId>,
    links: SlotArena<Link<K, V>>,
    oldest: Option<SlotId>,
    newest: Option<SlotId>,
}

impl<K, V> InsertionMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            index: FxHashMap::default(),
            links: SlotArena::new(),
            oldest: None,
            newest: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let id = *self.index.get(key)?;
        self.links.get(id).map(|link| &link.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let id = *self.index.get(key)?;
        self.links.get_mut(id).map(|link| &mut link.value)
    }

    /// Inserts `value` under `key`.
    ///
    /// A new key is placed at the newest end. An existing key keeps its
    /// position and its previous value is returned.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&id) = self.index.get(&key) {
            return self
                .links
                .get_mut(id)
                .map(|link| std::mem::replace(&mut link.value, value));
        }

        let id = self.links.insert(Link {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.attach_newest(id);
        self.index.insert(key, id);
        None
    }

    /// Returns the value under `key`, inserting `make()` at the newest end
    /// if absent. An existing key keeps its position.
    pub fn get_or_insert_with(&mut self, key: &K, make: impl FnOnce() -> V) -> &mut V {
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => {
                let id = self.links.insert(Link {
                    key: key.clone(),
                    value: make(),
                    prev: None,
                    next: None,
                });
                self.attach_newest(id);
                self.index.insert(key.clone(), id);
                id
            },
        };
        &mut self.links.get_mut(id).expect("index/arena out of sync").value
    }

    /// Moves `key` to the newest end. Returns `false` if absent.
    pub fn touch(&mut self, key: &K) -> bool {
        let Some(&id) = self.index.get(key) else {
            return false;
        };
        if self.newest != Some(id) {
            self.detach(id);
            self.attach_newest(id);
        }
        true
    }

    /// Key at the oldest end, if any.
    pub fn oldest_key(&self) -> Option<&K> {
        self.oldest
            .and_then(|id| self.links.get(id))
            .map(|link| &link.key)
    }

    /// Removes and returns the oldest entry.
    pub fn pop_oldest(&mut self) -> Option<(K, V)> {
        let id = self.oldest?;
        self.detach(id);
        let link = self.links.remove(id)?;
        self.index.remove(&link.key);
        Some((link.key, link.value))
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let id = self.index.remove(key)?;
        self.detach(id);
        self.links.remove(id).map(|link| link.value)
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        let mut cursor = self.oldest;
        while let Some(id) = cursor {
            let Some(link) = self.links.get_mut(id) else {
                break;
            };
            cursor = link.next;
            if !keep(&link.key, &mut link.value) {
                let key = link.key.clone();
                self.index.remove(&key);
                self.detach(id);
                self.links.remove(id);
            }
        }
    }

    /// Iterates keys from oldest to newest.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            map: self,
            cursor: self.oldest,
        }
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.links.clear();
        self.oldest = None;
        self.newest = None;
    }

    fn detach(&mut self, id: SlotId) {
        let Some((prev, next)) = self.links.get(id).map(|link| (link.prev, link.next)) else {
            return;
        };

        match prev {
            Some(prev_id) => {
                if let Some(link) = self.links.get_mut(prev_id) {
                    link.next = next;
                }
            },
            None => self.oldest = next,
        }
        match next {
            Some(next_id) => {
                if let Some(link) = self.links.get_mut(next_id) {
                    link.prev = prev;
                }
            },
            None => self.newest = prev,
        }
        if let Some(link) = self.links.get_mut(id) {
            link.prev = None;
            link.next = None;
        }
    }

    fn attach_newest(&mut self, id: SlotId) {
        let old_newest = self.newest;
        if let Some(link) = self.links.get_mut(id) {
            link.prev = old_newest;
            link.next = None;
        }
        match old_newest {
            Some(tail) => {
                if let Some(link) = self.links.get_mut(tail) {
                    link.next = Some(id);
                }
            },
            None => self.oldest = Some(id),
        }
        self.newest = Some(id);
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let mut count = 0usize;
        let mut prev = None;
        let mut cursor = self.oldest;
        while let Some(id) = cursor {
            let link = self.links.get(id).expect("linked slot missing");
            assert_eq!(link.prev, prev);
            assert_eq!(self.index.get(&link.key), Some(&id));
            prev = Some(id);
            cursor = link.next;
            count += 1;
            assert!(count <= self.index.len());
        }
        assert_eq!(self.newest, prev);
        assert_eq!(count, self.index.len());
        assert_eq!(self.links.len(), self.index.len());
    }
}

impl<K, V> Default for InsertionMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

pub struct Keys<'a, K, V> {
    map: &'a InsertionMap<K, V>,
    cursor: Option<SlotId>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let link = self.map.links.get(id)?;
        self.cursor = link.next;
        Some(&link.key)
    }
}
