//! # Extension Traits
//!
//! Two seams let callers change how memoization behaves without touching the
//! memoizer itself.
//!
//! ```text
//!   ┌──────────────────────────────┐        ┌──────────────────────────────────┐
//!   │       Serializer<R>          │        │           CacheModel             │
//!   │                              │        │                                  │
//!   │  write_to(&R) → Stored       │        │  enter_scope(dim, body)          │
//!   │  read_from(&Stored)          │        │  enter_scope_async(dim, fut)     │
//!   │      → Option<R>             │        │  current_override() → Option<dim>│
//!   │                              │        │  resolve_store_for(owner, make)  │
//!   └──────────────┬───────────────┘        └────────────────┬─────────────────┘
//!                  │                                         │
//!        ┌─────────┴─────────┐                    ┌──────────┴───────────┐
//!        ▼                   ▼                    ▼                      ▼
//!     Identity          SerializerFn          StackModel          TaskLocalModel
//!   (clone as is)     (closure pair)      (per-thread stack)   (tokio task-local)
//! ```
//!
//! ## Serializer
//!
//! Transforms a fresh result before it is stored and a stored value before it
//! is returned from a hit. Returning `None` from `read_from` turns the hit
//! into a miss, which is how callers build expiry:
//!
//! ```
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! use memokit::builder::MemoizeBuilder;
//! use memokit::traits::SerializerFn;
//!
//! let ttl = Duration::from_secs(60);
//! let lookup = MemoizeBuilder::new()
//!     .serializer(SerializerFn::new(
//!         |v: &u32| (Instant::now(), *v),
//!         move |(at, v): &(Instant, u32)| (at.elapsed() < ttl).then_some(*v),
//!     ))
//!     .build(|(_k,): &(Arc<String>,)| 7u32);
//!
//! let key = Arc::new(String::from("k"));
//! assert_eq!(lookup.call((Arc::clone(&key),)).unwrap(), 7);
//! ```
//!
//! ## CacheModel
//!
//! A cache model implements one named scope's "current override". While a
//! dimension is entered, memoized calls of that scope resolve their store
//! through it. Models must restore the previous override on every exit path,
//! including panics and dropped futures.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::CacheError;
use crate::key::Anchor;
use crate::store::{AnyStore, CacheDimension};

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Read/write transform applied around the key-chain store.
pub trait Serializer<R>: Send + Sync {
    /// Representation kept in the store.
    ///
    /// Hits clone it out of the store before `read_from` runs, so both
    /// transforms run without the store lock held.
    type Stored: Clone + Send + 'static;

    fn write_to(&self, result: &R) -> Self::Stored;

    /// `None` forces a recompute for this call.
    fn read_from(&self, stored: &Self::Stored) -> Option<R>;
}

/// Stores results as they are, returning clones on hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<R: Clone + Send + 'static> Serializer<R> for Identity {
    type Stored = R;

    #[inline]
    fn write_to(&self, result: &R) -> R {
        result.clone()
    }

    #[inline]
    fn read_from(&self, stored: &R) -> Option<R> {
        Some(stored.clone())
    }
}

/// Serializer built from a pair of closures.
pub struct SerializerFn<R, S, W, Rd> {
    write: W,
    read: Rd,
    _marker: PhantomData<fn(&R, &S)>,
}

impl<R, S, W, Rd> SerializerFn<R, S, W, Rd>
where
    W: Fn(&R) -> S,
    Rd: Fn(&S) -> Option<R>,
{
    pub fn new(write: W, read: Rd) -> Self {
        Self {
            write,
            read,
            _marker: PhantomData,
        }
    }
}

impl<R, S, W, Rd> Serializer<R> for SerializerFn<R, S, W, Rd>
where
    S: Clone + Send + 'static,
    W: Fn(&R) -> S + Send + Sync,
    Rd: Fn(&S) -> Option<R> + Send + Sync,
{
    type Stored = S;

    fn write_to(&self, result: &R) -> S {
        (self.write)(result)
    }

    fn read_from(&self, stored: &S) -> Option<R> {
        (self.read)(stored)
    }
}

impl<R, S, W, Rd> fmt::Debug for SerializerFn<R, S, W, Rd> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerFn").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// CacheModel
// ---------------------------------------------------------------------------

/// Backend for one named scope's current cache override.
///
/// The trait is object safe; generic entry points live on `dyn CacheModel`
/// ([`create_scope`](trait.CacheModel.html#method.create_scope),
/// [`create_scope_async`](trait.CacheModel.html#method.create_scope_async)).
pub trait CacheModel: Send + Sync + fmt::Debug {
    /// Runs `body` with `dimension` as the active override.
    ///
    /// The previous override is restored when `body` returns or unwinds.
    ///
    /// # Errors
    ///
    /// [`CacheError::ScopeSynchronization`] if, on exit, the active override
    /// is not `dimension`. The previous state is restored regardless.
    fn enter_scope(&self, dimension: &CacheDimension, body: &mut dyn FnMut()) -> Result<(), CacheError>;

    /// Async form of [`enter_scope`](Self::enter_scope): the override stays
    /// active until `body` completes or the returned future is dropped.
    fn enter_scope_async<'a>(
        &self,
        dimension: &CacheDimension,
        body: BoxFuture<'a, ()>,
    ) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Dimension currently active for this scope, if any.
    fn current_override(&self) -> Option<CacheDimension>;

    /// Store bound to `owner` under the active override, created with
    /// `factory` on first use. `None` when no override is active.
    fn resolve_store_for(
        &self,
        owner: &Anchor,
        factory: &mut dyn FnMut() -> AnyStore,
    ) -> Result<Option<AnyStore>, CacheError> {
        match self.current_override() {
            Some(dimension) => dimension.resolve(owner, factory).map(Some),
            None => Ok(None),
        }
    }
}

impl dyn CacheModel {
    /// Runs `body` inside `dimension` and returns its value.
    pub fn create_scope<T>(&self, dimension: &CacheDimension, body: impl FnOnce() -> T) -> Result<T, CacheError> {
        let mut body = Some(body);
        let mut out = None;
        self.enter_scope(dimension, &mut || {
            if let Some(body) = body.take() {
                out = Some(body());
            }
        })?;
        out.ok_or(CacheError::ScopeNotEntered)
    }

    /// Awaits `body` inside `dimension` and returns its output.
    pub async fn create_scope_async<T, F>(&self, dimension: &CacheDimension, body: F) -> Result<T, CacheError>
    where
        T: Send,
        F: Future<Output = T> + Send,
    {
        let mut out = None;
        let slot = &mut out;
        let body = async move {
            *slot = Some(body.await);
        }
        .boxed();
        self.enter_scope_async(dimension, body).await?;
        out.ok_or(CacheError::ScopeNotEntered)
    }
}
