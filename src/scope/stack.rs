//! Explicit stack cache model.
//!
//! Each model keeps one stack of dimensions per thread. Entering a scope
//! pushes, leaving pops and checks that the popped dimension is the one that
//! was pushed.
//!
//! ```text
//!   thread A: STACKS[model 3] = [ dim#1, dim#4 ]   ◄── top is the override
//!   thread B: STACKS[model 3] = [ ]
//! ```
//!
//! Async bodies push their dimension before each poll and pop it right after,
//! so a scoped future leaves nothing on the thread while it is suspended and
//! may resume on another worker. Scoped futures can interleave freely.
//! Work the body spawns does not inherit the override; use
//! [`TaskLocalModel`](crate::scope::TaskLocalModel) to carry it into
//! spawned tasks.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use rustc_hash::FxHashMap;

use crate::error::CacheError;
use crate::store::CacheDimension;
use crate::traits::CacheModel;

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static STACKS: RefCell<FxHashMap<u64, Vec<CacheDimension>>> = RefCell::new(FxHashMap::default());
}

fn push(model: u64, dimension: &CacheDimension) {
    STACKS.with_borrow_mut(|stacks| stacks.entry(model).or_default().push(dimension.clone()));
}

fn pop(model: u64, expected: &CacheDimension) -> Result<(), CacheError> {
    let popped = STACKS.with_borrow_mut(|stacks| {
        let stack = stacks.get_mut(&model)?;
        let top = stack.pop();
        if stack.is_empty() {
            stacks.remove(&model);
        }
        top
    });
    match popped {
        Some(top) if top == *expected => Ok(()),
        other => {
            let found = other.map(|dimension| dimension.id());
            tracing::error!(
                expected = expected.id(),
                ?found,
                "cache scope synchronization failed, overlapping scoped calls?"
            );
            Err(CacheError::ScopeSynchronization {
                expected: expected.id(),
                found,
            })
        },
    }
}

fn top(model: u64) -> Option<CacheDimension> {
    STACKS.with_borrow(|stacks| stacks.get(&model).and_then(|stack| stack.last().cloned()))
}

/// Pops on unwind; a normal exit disarms it and pops with checking.
struct PopOnUnwind<'a> {
    model: u64,
    dimension: &'a CacheDimension,
    armed: bool,
}

impl Drop for PopOnUnwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = pop(self.model, self.dimension);
        }
    }
}

/// Cache model backed by a per-thread stack.
#[derive(Debug)]
pub struct StackModel {
    id: u64,
}

impl StackModel {
    pub fn new() -> Self {
        Self {
            id: NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Number of dimensions entered on the current thread.
    pub fn depth(&self) -> usize {
        STACKS.with_borrow(|stacks| stacks.get(&self.id).map_or(0, Vec::len))
    }
}

impl Default for StackModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheModel for StackModel {
    fn enter_scope(&self, dimension: &CacheDimension, body: &mut dyn FnMut()) -> Result<(), CacheError> {
        push(self.id, dimension);
        let mut guard = PopOnUnwind {
            model: self.id,
            dimension,
            armed: true,
        };
        body();
        guard.armed = false;
        pop(self.id, dimension)
    }

    fn enter_scope_async<'a>(
        &self,
        dimension: &CacheDimension,
        body: BoxFuture<'a, ()>,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        StackScoped {
            model: self.id,
            dimension: dimension.clone(),
            body,
        }
        .boxed()
    }

    fn current_override(&self) -> Option<CacheDimension> {
        top(self.id)
    }
}

/// Runs every poll of `body` with `dimension` pushed.
struct StackScoped<'a> {
    model: u64,
    dimension: CacheDimension,
    body: BoxFuture<'a, ()>,
}

impl Future for StackScoped<'_> {
    type Output = Result<(), CacheError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        push(this.model, &this.dimension);
        let mut guard = PopOnUnwind {
            model: this.model,
            dimension: &this.dimension,
            armed: true,
        };
        let polled = this.body.poll_unpin(cx);
        guard.armed = false;
        let popped = pop(this.model, &this.dimension);
        match (polled, popped) {
            (Poll::Pending, Ok(())) => Poll::Pending,
            (Poll::Pending, Err(err)) => Poll::Ready(Err(err)),
            (Poll::Ready(()), popped) => Poll::Ready(popped),
        }
    }
}
