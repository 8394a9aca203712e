//! Combinators built from memoizers and scope models.
//!
//! | Combinator       | Keyed by                   | Runs the function inside        |
//! |------------------|----------------------------|---------------------------------|
//! | [`boxed`]        | `[box key, ...args]`       | the caller's dimension          |
//! | [`nested_box`]   | `[box key, ...args]`       | a private dimension per box key |
//! | [`fork`]         | not memoized itself        | the fork's private dimension    |
//! | [`isolate_with`] | not memoized               | a private dimension per pointer |
//!
//! Private dimensions are looked up by `[generation, pointer]` in a small
//! internal table. While an override is active the table lives inside that
//! override, so private dimensions created in different isolated regions
//! never meet. A singleton fork always uses the process-wide table.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use memokit::{isolate, memoize};
//!
//! let key = Arc::new(());
//! let make = memoize(|(_k,): &(Arc<()>,)| Arc::new(0u8));
//!
//! let outside = make.call((Arc::clone(&key),)).unwrap();
//! let inside = isolate(|| make.call((Arc::clone(&key),)).unwrap()).unwrap();
//! assert!(!Arc::ptr_eq(&outside, &inside));
//! assert!(Arc::ptr_eq(&outside, &make.call((Arc::clone(&key),)).unwrap()));
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

use crate::error::CacheError;
use crate::generation::generation;
use crate::key::{Anchor, Argument, Arguments, Key};
use crate::memoizer::{MemoCore, MemoOptions, Prefixed};
use crate::scope::{Scope, scope_model};
use crate::store::{CacheDimension, KeyChainStore, SharedStore, WriteOptions};
use crate::traits::{CacheModel, Identity};

// ---------------------------------------------------------------------------
// Private dimensions
// ---------------------------------------------------------------------------

/// Owner of the dimension table stored inside override dimensions.
static DIMENSION_OWNER: LazyLock<Anchor> = LazyLock::new(Anchor::new);

/// Dimension table used outside any override.
static DIMENSION_TABLE: LazyLock<SharedStore<CacheDimension>> =
    LazyLock::new(|| Arc::new(Mutex::new(KeyChainStore::new())));

/// Returns the private dimension bound to `pointer`, creating it if needed.
///
/// Unless `shared` is set, the lookup happens inside the active override of
/// `model`, if any.
fn private_dimension(model: &dyn CacheModel, pointer: &Key, shared: bool) -> Result<CacheDimension, CacheError> {
    let table = match model.current_override() {
        Some(active) if !shared => active.store_for::<CacheDimension>(&DIMENSION_OWNER)?,
        _ => Arc::clone(&DIMENSION_TABLE),
    };
    let chain = [Key::Ref(generation()), pointer.clone()];
    let mut table = table.lock();
    table.get_or_insert_with(&chain, WriteOptions::default(), CacheDimension::new)
}

// ---------------------------------------------------------------------------
// Box
// ---------------------------------------------------------------------------

/// Memoized function keyed by an explicit box key plus its arguments.
pub struct Boxed<A, R, F> {
    f: F,
    core: MemoCore<R>,
    _marker: PhantomData<fn(&A) -> R>,
}

impl<A, R, F> Boxed<A, R, F>
where
    A: Arguments,
    R: Clone + Send + 'static,
    F: Fn(&A) -> R,
{
    /// Calls `f(&args)`, memoized under `[key, ...args]`.
    ///
    /// `key` is not passed to `f`; it only anchors the entry. It should be
    /// reclaimable when all of `args` are durable.
    pub fn call(&self, key: &dyn Argument, args: A) -> Result<R, CacheError> {
        let keyed = Prefixed { head: key, rest: &args };
        self.core.invoke(&keyed, &Identity, || Ok((self.f)(&args)))
    }
}

impl<A, R, F> fmt::Debug for Boxed<A, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Boxed").field("core", &self.core).finish_non_exhaustive()
    }
}

/// Memoizes `f` under a caller-supplied box key.
///
/// ```
/// use std::sync::Arc;
///
/// use memokit::boxed;
///
/// let area = boxed(|(w, h): &(u32, u32)| Arc::new(w * h));
/// let session = Arc::new(());
/// let a = area.call(&session, (3, 4)).unwrap();
/// let b = area.call(&session, (3, 4)).unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
pub fn boxed<A, R, F>(f: F) -> Boxed<A, R, F>
where
    A: Arguments,
    R: Clone + Send + 'static,
    F: Fn(&A) -> R,
{
    Boxed {
        f,
        core: MemoCore::new(MemoOptions::default()),
        _marker: PhantomData,
    }
}

// ---------------------------------------------------------------------------
// NestedBox
// ---------------------------------------------------------------------------

/// Like [`Boxed`], but `f` runs inside a private dimension of the box key.
pub struct NestedBoxed<A, R, F> {
    f: F,
    core: MemoCore<R>,
    _marker: PhantomData<fn(&A) -> R>,
}

impl<A, R, F> NestedBoxed<A, R, F>
where
    A: Arguments,
    R: Clone + Send + 'static,
    F: Fn(&A) -> R,
{
    /// Calls `f(&args)` memoized under `[key, ...args]`.
    ///
    /// On a miss, every memoized call made by `f` in this box's scope is
    /// redirected into the dimension private to `key`.
    pub fn call(&self, key: &dyn Argument, args: A) -> Result<R, CacheError> {
        let keyed = Prefixed { head: key, rest: &args };
        self.core.invoke(&keyed, &Identity, || {
            let model = scope_model(self.core.scope());
            let dimension = private_dimension(&*model, &key.key(), false)?;
            model.create_scope(&dimension, || (self.f)(&args))
        })
    }
}

impl<A, R, F> fmt::Debug for NestedBoxed<A, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedBoxed").field("core", &self.core).finish_non_exhaustive()
    }
}

/// [`nested_box_in`] for the default scope.
pub fn nested_box<A, R, F>(f: F) -> NestedBoxed<A, R, F>
where
    A: Arguments,
    R: Clone + Send + 'static,
    F: Fn(&A) -> R,
{
    nested_box_in(Scope::DEFAULT, f)
}

/// Boxes `f` and gives every box key its own dimension in `scope`.
pub fn nested_box_in<A, R, F>(scope: impl Into<Scope>, f: F) -> NestedBoxed<A, R, F>
where
    A: Arguments,
    R: Clone + Send + 'static,
    F: Fn(&A) -> R,
{
    let options = MemoOptions {
        scope: scope.into(),
        ..MemoOptions::default()
    };
    NestedBoxed {
        f,
        core: MemoCore::new(options),
        _marker: PhantomData,
    }
}

// ---------------------------------------------------------------------------
// Fork
// ---------------------------------------------------------------------------

/// Options for [`fork`].
#[derive(Debug, Clone, Default)]
pub struct ForkOptions {
    /// Use one process-wide dimension even inside overrides.
    pub singleton: bool,
    /// Forks sharing a pointer share their dimension. Defaults to a fresh
    /// token per fork.
    pub pointer: Option<Key>,
    pub scope: Scope,
}

/// A function bound to its own private dimension.
pub struct Forked<A, R, F> {
    f: F,
    pointer: Key,
    singleton: bool,
    scope: Scope,
    _marker: PhantomData<fn(&A) -> R>,
}

impl<A, R, F> Forked<A, R, F>
where
    F: Fn(&A) -> R,
{
    pub fn call(&self, args: A) -> Result<R, CacheError> {
        let model = scope_model(&self.scope);
        let dimension = private_dimension(&*model, &self.pointer, self.singleton)?;
        model.create_scope(&dimension, || (self.f)(&args))
    }
}

impl<A, R, F> fmt::Debug for Forked<A, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forked")
            .field("pointer", &self.pointer)
            .field("singleton", &self.singleton)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Binds `f` to a private dimension; see [`ForkOptions`].
///
/// ```
/// use std::sync::Arc;
///
/// use memokit::{ForkOptions, fork, memoize};
///
/// let make = memoize(|(_k,): &(Arc<()>,)| Arc::new(()));
/// let key = Arc::new(());
/// let forked = fork(|(k,): &(Arc<()>,)| make.call((Arc::clone(k),)).unwrap(), ForkOptions::default());
///
/// let a = forked.call((Arc::clone(&key),)).unwrap();
/// let b = forked.call((Arc::clone(&key),)).unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// assert!(!Arc::ptr_eq(&a, &make.call((key,)).unwrap()));
/// ```
pub fn fork<A, R, F>(f: F, options: ForkOptions) -> Forked<A, R, F>
where
    F: Fn(&A) -> R,
{
    Forked {
        f,
        pointer: options.pointer.unwrap_or_else(|| Key::Ref(Anchor::new())),
        singleton: options.singleton,
        scope: options.scope,
        _marker: PhantomData,
    }
}

// ---------------------------------------------------------------------------
// Isolation
// ---------------------------------------------------------------------------

/// Options for [`isolate_with`] and [`isolate_async`].
#[derive(Debug, Clone, Default)]
pub struct IsolateOptions {
    /// Regions sharing a pointer share their dimension. Defaults to a fresh
    /// token, giving every region a dimension of its own.
    pub pointer: Option<Key>,
    pub scope: Scope,
}

/// Runs `body` in a fresh private dimension of the default scope.
pub fn isolate<T>(body: impl FnOnce() -> T) -> Result<T, CacheError> {
    isolate_with(IsolateOptions::default(), body)
}

/// Runs `body` in the private dimension selected by `options`.
pub fn isolate_with<T>(options: IsolateOptions, body: impl FnOnce() -> T) -> Result<T, CacheError> {
    let pointer = options.pointer.unwrap_or_else(|| Key::Ref(Anchor::new()));
    let model = scope_model(&options.scope);
    let dimension = private_dimension(&*model, &pointer, false)?;
    model.create_scope(&dimension, body)
}

/// Awaits `body` in the private dimension selected by `options`.
pub async fn isolate_async<T, F>(options: IsolateOptions, body: F) -> Result<T, CacheError>
where
    T: Send,
    F: Future<Output = T> + Send,
{
    let pointer = options.pointer.unwrap_or_else(|| Key::Ref(Anchor::new()));
    let model = scope_model(&options.scope);
    let dimension = private_dimension(&*model, &pointer, false)?;
    model.create_scope_async(&dimension, body).await
}
