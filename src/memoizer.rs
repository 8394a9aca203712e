//! Memoized function wrappers.
//!
//! ## Call Flow
//!
//! ```text
//!   call(args)
//!     │
//!     ├─ 1. store   = scope override's store for this function, else own store
//!     ├─ 2. selectors = resolver() (must hold a reclaimable key), else [default]
//!     ├─ 3. chain   = [generation, ...selectors, ...args (coerced positions)]
//!     │      └─ no reclaimable argument and no bypass ─► MissingReclaimableKey
//!     ├─ 4. hit?    = store.get(chain).cloned().and_then(read_from)  ─► return
//!     └─ 5. miss    = f(&args)  ─► store.set(chain, write_to(&result))  ─► return result
//! ```
//!
//! The store lock is held only for the lookup and the insert. `f` and the
//! serializer run without it, so memoized functions may call each other (or
//! themselves) freely. Errors returned by a fallible function
//! are passed through untouched and never stored.
//!
//! Results are handed out by clone. Wrap results in `Arc` to share one
//! allocation between callers, or return a `futures::future::Shared` future
//! so that concurrent callers await one computation.

use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::builder::MemoizeBuilder;
use crate::error::CacheError;
use crate::generation::{default_selector, generation};
use crate::key::{Anchor, Argument, Arguments, Key, extend_chain};
use crate::scope::{Scope, scope_model};
use crate::store::dimension::{downcast_store, erased_store};
use crate::store::{KeyChainStore, SharedStore, StoreStats, WriteOptions};
use crate::traits::{Identity, Serializer};

/// Produces the selector keys placed in front of the arguments.
pub type Resolver = Arc<dyn Fn() -> Vec<Key> + Send + Sync>;

/// Validated memoizer configuration.
#[derive(Clone, Default)]
pub(crate) struct MemoOptions {
    pub(crate) resolver: Option<Resolver>,
    pub(crate) limit: Option<NonZeroUsize>,
    pub(crate) allow_durable_only: bool,
    pub(crate) scope: Scope,
    pub(crate) coerce: Vec<usize>,
}

impl fmt::Debug for MemoOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoOptions")
            .field("resolver", &self.resolver.is_some())
            .field("limit", &self.limit)
            .field("allow_durable_only", &self.allow_durable_only)
            .field("scope", &self.scope)
            .field("coerce", &self.coerce)
            .finish()
    }
}

/// Snapshot of a memoizer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Hits rejected by the serializer's `read_from`.
    pub rejected: u64,
    /// Stats of the memoizer's own store (not of override dimensions).
    pub store: StoreStats,
}

#[derive(Debug, Default)]
struct MemoCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    rejected: AtomicU64,
}

/// Arguments with one extra key in front, used by the box combinators.
pub(crate) struct Prefixed<'a, A: ?Sized> {
    pub(crate) head: &'a dyn Argument,
    pub(crate) rest: &'a A,
}

impl<A: Arguments + ?Sized> Arguments for Prefixed<'_, A> {
    fn arity(&self) -> usize {
        1 + self.rest.arity()
    }

    fn visit(&self, visitor: &mut dyn FnMut(usize, &dyn Argument)) {
        visitor(0, self.head);
        self.rest.visit(&mut |idx, arg| visitor(idx + 1, arg));
    }
}

/// Function-independent half of a memoizer: identity, store and options.
pub(crate) struct MemoCore<S> {
    owner: Anchor,
    store: SharedStore<S>,
    options: MemoOptions,
    counters: MemoCounters,
}

impl<S: Clone + Send + 'static> MemoCore<S> {
    pub(crate) fn new(options: MemoOptions) -> Self {
        Self {
            owner: Anchor::new(),
            store: Arc::new(Mutex::new(KeyChainStore::new())),
            options,
            counters: MemoCounters::default(),
        }
    }

    pub(crate) fn scope(&self) -> &Scope {
        &self.options.scope
    }

    /// Store for the current call and whether it came from an override.
    fn active_store(&self) -> Result<(SharedStore<S>, bool), CacheError> {
        let model = scope_model(&self.options.scope);
        match model.resolve_store_for(&self.owner, &mut erased_store::<S>)? {
            Some(store) => Ok((downcast_store(store), true)),
            None => Ok((Arc::clone(&self.store), false)),
        }
    }

    fn key_chain<A: Arguments + ?Sized>(&self, args: &A) -> Result<Vec<Key>, CacheError> {
        let mut chain = vec![Key::Ref(generation())];
        let mut reclaimable = 0;
        match &self.options.resolver {
            Some(resolver) => {
                let selectors = resolver();
                let found = selectors.iter().filter(|key| key.is_reclaimable()).count();
                if found == 0 {
                    return Err(CacheError::ResolverContract {
                        produced: selectors.len(),
                    });
                }
                reclaimable += found;
                chain.extend(selectors);
            },
            None => chain.push(Key::Ref(default_selector())),
        }
        reclaimable += extend_chain(args, &self.options.coerce, &mut chain);

        if reclaimable == 0 && !self.options.allow_durable_only {
            return Err(CacheError::MissingReclaimableKey {
                durable: args.arity(),
            });
        }
        Ok(chain)
    }

    /// Runs one memoized call.
    pub(crate) fn invoke<A, R, E>(
        &self,
        args: &A,
        serializer: &impl Serializer<R, Stored = S>,
        compute: impl FnOnce() -> Result<R, E>,
    ) -> Result<R, E>
    where
        A: Arguments + ?Sized,
        E: From<CacheError>,
    {
        let (store, in_override) = self.active_store()?;
        let chain = self.key_chain(args)?;

        let found = store.lock().get(&chain).cloned();
        match found.map(|stored| serializer.read_from(&stored)) {
            Some(Some(result)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(scope = %self.options.scope, in_override, "memo hit");
                return Ok(result);
            },
            Some(None) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(scope = %self.options.scope, "stored value rejected by serializer");
            },
            None => {},
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(scope = %self.options.scope, in_override, "memo miss");

        let result = compute()?;
        let stored = serializer.write_to(&result);
        let options = WriteOptions {
            limit: self.options.limit,
            allow_durable_only: self.options.allow_durable_only,
        };
        store.lock().set(&chain, stored, options)?;
        Ok(result)
    }

    pub(crate) fn metrics(&self) -> MemoMetrics {
        MemoMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            store: self.store.lock().stats(),
        }
    }

    pub(crate) fn purge(&self) -> usize {
        self.store.lock().purge()
    }

    pub(crate) fn owner(&self) -> &Anchor {
        &self.owner
    }
}

impl<S> fmt::Debug for MemoCore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCore")
            .field("owner", &self.owner)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Memoized
// ---------------------------------------------------------------------------

/// A memoized infallible function `Fn(&A) -> R`.
///
/// Built by [`memoize`] or [`MemoizeBuilder::build`].
pub struct Memoized<A, R, F, Z = Identity>
where
    Z: Serializer<R>,
{
    f: F,
    serializer: Z,
    core: MemoCore<Z::Stored>,
    _marker: PhantomData<fn(&A) -> R>,
}

impl<A, R, F, Z> Memoized<A, R, F, Z>
where
    A: Arguments,
    F: Fn(&A) -> R,
    Z: Serializer<R>,
{
    pub(crate) fn from_parts(f: F, serializer: Z, options: MemoOptions) -> Self {
        Self {
            f,
            serializer,
            core: MemoCore::new(options),
            _marker: PhantomData,
        }
    }

    /// Returns the cached result for `args`, computing it on a miss.
    ///
    /// # Errors
    ///
    /// Only caching contract violations: [`CacheError::MissingReclaimableKey`]
    /// and [`CacheError::ResolverContract`]. `f` is not called in that case.
    pub fn call(&self, args: A) -> Result<R, CacheError> {
        self.core
            .invoke(&args, &self.serializer, || Ok((self.f)(&args)))
    }

    pub fn metrics(&self) -> MemoMetrics {
        self.core.metrics()
    }

    /// Sweeps dead branches out of this function's own store.
    pub fn purge(&self) -> usize {
        self.core.purge()
    }

    /// Identity under which override dimensions store this function's entries.
    pub fn owner(&self) -> &Anchor {
        self.core.owner()
    }

    pub fn scope(&self) -> &Scope {
        self.core.scope()
    }
}

impl<A, R, F, Z: Serializer<R>> fmt::Debug for Memoized<A, R, F, Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized").field("core", &self.core).finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// TryMemoized
// ---------------------------------------------------------------------------

/// A memoized fallible function `Fn(&A) -> Result<R, E>`.
///
/// Only `Ok` values are stored; an `Err` reaches the caller unchanged and
/// the next call with the same arguments runs `f` again. Caching contract
/// violations are reported through `E: From<CacheError>`.
///
/// Built by [`MemoizeBuilder::build_fallible`].
pub struct TryMemoized<A, R, E, F, Z = Identity>
where
    Z: Serializer<R>,
{
    f: F,
    serializer: Z,
    core: MemoCore<Z::Stored>,
    _marker: PhantomData<fn(&A) -> Result<R, E>>,
}

impl<A, R, E, F, Z> TryMemoized<A, R, E, F, Z>
where
    A: Arguments,
    E: From<CacheError>,
    F: Fn(&A) -> Result<R, E>,
    Z: Serializer<R>,
{
    pub(crate) fn from_parts(f: F, serializer: Z, options: MemoOptions) -> Self {
        Self {
            f,
            serializer,
            core: MemoCore::new(options),
            _marker: PhantomData,
        }
    }

    pub fn call(&self, args: A) -> Result<R, E> {
        self.core.invoke(&args, &self.serializer, || (self.f)(&args))
    }

    pub fn metrics(&self) -> MemoMetrics {
        self.core.metrics()
    }

    pub fn purge(&self) -> usize {
        self.core.purge()
    }

    pub fn owner(&self) -> &Anchor {
        self.core.owner()
    }
}

impl<A, R, E, F, Z: Serializer<R>> fmt::Debug for TryMemoized<A, R, E, F, Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryMemoized").field("core", &self.core).finish_non_exhaustive()
    }
}

/// Memoizes `f` with default options.
///
/// ```
/// use std::sync::Arc;
///
/// use memokit::memoize;
///
/// let len = memoize(|(s,): &(Arc<String>,)| Arc::new(s.len()));
/// let input = Arc::new(String::from("hello"));
/// let first = len.call((Arc::clone(&input),)).unwrap();
/// let second = len.call((Arc::clone(&input),)).unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
pub fn memoize<A, R, F>(f: F) -> Memoized<A, R, F>
where
    A: Arguments,
    R: Clone + Send + 'static,
    F: Fn(&A) -> R,
{
    MemoizeBuilder::new().build(f)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::store::CacheDimension;

    #[test]
    fn same_reclaimable_argument_hits() {
        let calls = Cell::new(0);
        let f = memoize(|(_k,): &(Arc<u8>,)| {
            calls.set(calls.get() + 1);
            Arc::new(())
        });
        let key = Arc::new(1u8);
        let a = f.call((Arc::clone(&key),)).unwrap();
        let b = f.call((Arc::clone(&key),)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.get(), 1);

        let other = f.call((Arc::new(1u8),)).unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(f.metrics().hits, 1);
        assert_eq!(f.metrics().misses, 2);
    }

    #[test]
    fn durable_only_arguments_are_refused_before_running() {
        let calls = Cell::new(0);
        let f = memoize(|(n,): &(u32,)| {
            calls.set(calls.get() + 1);
            *n
        });
        assert_eq!(
            f.call((1,)),
            Err(CacheError::MissingReclaimableKey { durable: 1 })
        );
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn bypass_allows_durable_only_arguments() {
        let calls = Cell::new(0);
        let f = MemoizeBuilder::new()
            .allow_durable_only(true)
            .build(|(n,): &(u32,)| {
                calls.set(calls.get() + 1);
                n * 10
            });
        assert_eq!(f.call((2,)), Ok(20));
        assert_eq!(f.call((2,)), Ok(20));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn resolver_must_produce_a_reclaimable_key() {
        let f = MemoizeBuilder::new()
            .resolver(|| vec![Key::from(1u8)])
            .build(|(n,): &(u32,)| *n);
        assert_eq!(
            f.call((1,)),
            Err(CacheError::ResolverContract { produced: 1 })
        );
    }

    #[test]
    fn resolver_selector_partitions_entries() {
        let tenant = Arc::new(Mutex::new(Anchor::new()));
        let calls = Cell::new(0);
        let selector = Arc::clone(&tenant);
        let f = MemoizeBuilder::new()
            .resolver(move || vec![Key::Ref(selector.lock().clone())])
            .build(|(n,): &(u32,)| {
                calls.set(calls.get() + 1);
                *n
            });

        f.call((1,)).unwrap();
        f.call((1,)).unwrap();
        assert_eq!(calls.get(), 1);

        *tenant.lock() = Anchor::new();
        f.call((1,)).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn override_dimension_still_requires_a_reclaimable_key() {
        let model = scope_model(&Scope::DEFAULT);
        let calls = Cell::new(0);
        let f = memoize(|(_k, n): &(Arc<()>, u32)| {
            calls.set(calls.get() + 1);
            Arc::new(*n)
        });
        let durable = memoize(|(n,): &(u32,)| *n);
        let key = Arc::new(());
        let dim = CacheDimension::new();

        let (a, b, refused) = model
            .create_scope(&dim, || {
                let a = f.call((Arc::clone(&key), 3)).unwrap();
                let b = f.call((Arc::clone(&key), 3)).unwrap();
                (a, b, durable.call((3,)))
            })
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.get(), 1);
        assert_eq!(refused, Err(CacheError::MissingReclaimableKey { durable: 1 }));
    }

    #[test]
    fn serializer_runs_without_the_store_lock() {
        use std::sync::OnceLock;

        use crate::traits::SerializerFn;

        type Stamp = SerializerFn<u64, u64, fn(&u64) -> u64, fn(&u64) -> Option<u64>>;
        type Stamped = Memoized<(Arc<()>,), u64, fn(&(Arc<()>,)) -> u64, Stamp>;
        static STAMPED: OnceLock<Stamped> = OnceLock::new();

        // Both transforms lock the memoizer's own store.
        fn write(v: &u64) -> u64 {
            if let Some(memo) = STAMPED.get() {
                memo.metrics();
            }
            *v
        }
        fn read(v: &u64) -> Option<u64> {
            if let Some(memo) = STAMPED.get() {
                memo.purge();
            }
            Some(*v)
        }
        fn compute((k,): &(Arc<()>,)) -> u64 {
            Arc::strong_count(k) as u64
        }

        let memo = STAMPED.get_or_init(|| {
            MemoizeBuilder::new()
                .serializer(Stamp::new(write, read))
                .build(compute as fn(&(Arc<()>,)) -> u64)
        });
        let key = Arc::new(());
        let first = memo.call((Arc::clone(&key),)).unwrap();
        assert_eq!(memo.call((Arc::clone(&key),)).unwrap(), first);
        assert_eq!(memo.metrics().hits, 1);
    }

    #[test]
    fn fallible_errors_are_not_stored() {
        #[derive(Debug, PartialEq)]
        enum Failure {
            Cache(CacheError),
            Flaky,
        }
        impl From<CacheError> for Failure {
            fn from(err: CacheError) -> Self {
                Failure::Cache(err)
            }
        }

        let calls = Cell::new(0);
        let f = MemoizeBuilder::new().build_fallible(|(_k,): &(Arc<()>,)| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 { Err(Failure::Flaky) } else { Ok(calls.get()) }
        });
        let key = Arc::new(());
        assert_eq!(f.call((Arc::clone(&key),)), Err(Failure::Flaky));
        assert_eq!(f.call((Arc::clone(&key),)), Ok(2));
        assert_eq!(f.call((Arc::clone(&key),)), Ok(2));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn recursive_calls_do_not_deadlock() {
        use std::sync::OnceLock;

        type Fib = Memoized<(Arc<()>, u64), u64, fn(&(Arc<()>, u64)) -> u64>;
        static FIB: OnceLock<Fib> = OnceLock::new();

        fn fib((ctx, n): &(Arc<()>, u64)) -> u64 {
            if *n < 2 {
                return *n;
            }
            let memo = FIB.get_or_init(|| memoize(fib as fn(&(Arc<()>, u64)) -> u64));
            memo.call((Arc::clone(ctx), n - 1)).unwrap() + memo.call((Arc::clone(ctx), n - 2)).unwrap()
        }

        let memo = FIB.get_or_init(|| memoize(fib as fn(&(Arc<()>, u64)) -> u64));
        assert_eq!(memo.call((Arc::new(()), 40)).unwrap(), 102_334_155);
    }

    #[test]
    fn prefixed_arguments_shift_positions() {
        let head = Anchor::new();
        let rest = (1u8, 2u8);
        let args = Prefixed { head: &head, rest: &rest };
        let mut positions = Vec::new();
        args.visit(&mut |idx, _| positions.push(idx));
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(args.arity(), 3);
    }
}
