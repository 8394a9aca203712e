//! Cache dimensions.
//!
//! A [`CacheDimension`] is an independently addressable family of key-chain
//! stores, one per memoized function. Scope models hand dimensions around as
//! the "current override"; while one is active every memoized call resolves
//! its store through it instead of using the function's own default store.
//!
//! ```text
//!   CacheDimension #7
//!     stores: KeyChainStore<AnyStore>
//!       [fn anchor A] ─► Mutex<KeyChainStore<A::Stored>>
//!       [fn anchor B] ─► Mutex<KeyChainStore<B::Stored>>
//! ```
//!
//! Function anchors are reclaimable keys, so a dropped memoized function
//! takes its per-dimension store with it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::CacheError;
use crate::key::{Anchor, Key};
use crate::store::key_chain::{KeyChainStore, WriteOptions};

/// A key-chain store shared between callers.
pub type SharedStore<V> = Arc<Mutex<KeyChainStore<V>>>;

/// Type-erased [`SharedStore`], as held inside a dimension.
pub type AnyStore = Arc<dyn Any + Send + Sync>;

static NEXT_DIMENSION_ID: AtomicU64 = AtomicU64::new(1);

/// Creates an empty shared store for values of type `V`, type-erased.
pub fn erased_store<V: Send + 'static>() -> AnyStore {
    Arc::new(Mutex::new(KeyChainStore::<V>::new()))
}

/// Recovers the typed store from an erased one.
///
/// A store of the wrong type means two owners were bound to one anchor; the
/// caller gets a detached store so the mismatch only costs cache hits.
pub fn downcast_store<V: Send + 'static>(store: AnyStore) -> SharedStore<V> {
    match store.downcast::<Mutex<KeyChainStore<V>>>() {
        Ok(typed) => typed,
        Err(_) => {
            tracing::warn!(
                value_type = std::any::type_name::<V>(),
                "dimension store has an unexpected value type, using a detached store"
            );
            Arc::new(Mutex::new(KeyChainStore::new()))
        },
    }
}

/// An independently addressable family of per-function stores.
///
/// Clones share the same stores. Two dimensions are equal only if one is a
/// clone of the other.
#[derive(Clone)]
pub struct CacheDimension {
    id: u64,
    stores: Arc<Mutex<KeyChainStore<AnyStore>>>,
}

impl CacheDimension {
    pub fn new() -> Self {
        let id = NEXT_DIMENSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(dimension = id, "cache dimension created");
        Self {
            id,
            stores: Arc::new(Mutex::new(KeyChainStore::new())),
        }
    }

    /// Process-unique identifier, used in diagnostics.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the store bound to `owner`, creating it with `factory` first
    /// if this dimension has none yet.
    pub fn resolve(
        &self,
        owner: &Anchor,
        factory: &mut dyn FnMut() -> AnyStore,
    ) -> Result<AnyStore, CacheError> {
        self.stores
            .lock()
            .get_or_insert_with(&[Key::Ref(owner.clone())], WriteOptions::default(), factory)
    }

    /// Typed form of [`resolve`](Self::resolve).
    pub fn store_for<V: Send + 'static>(&self, owner: &Anchor) -> Result<SharedStore<V>, CacheError> {
        self.resolve(owner, &mut erased_store::<V>).map(downcast_store)
    }

    /// Drops stores whose owners are gone. Returns how many were dropped.
    pub fn purge(&self) -> usize {
        self.stores.lock().purge()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }
}

impl Default for CacheDimension {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheDimension {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stores, &other.stores)
    }
}

impl Eq for CacheDimension {}

impl fmt::Debug for CacheDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheDimension").field(&self.id).finish()
    }
}
