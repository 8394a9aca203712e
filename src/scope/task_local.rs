//! Task-local cache model.
//!
//! Overrides live in a tokio task-local frame instead of a shared stack, so
//! concurrently interleaved scoped futures each see their own dimension.
//! The frame maps model ids to dimensions, letting several task-local scopes
//! nest independently.
//!
//! Spawned tasks do not inherit task-locals; wrap the spawned future with
//! [`propagate`] to carry the caller's overrides along.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Either};
use rustc_hash::FxHashMap;

use crate::error::CacheError;
use crate::store::CacheDimension;
use crate::traits::CacheModel;

type Frame = Arc<FxHashMap<u64, CacheDimension>>;

tokio::task_local! {
    static FRAME: Frame;
}

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1 << 32);

fn current_frame() -> Option<Frame> {
    FRAME.try_with(Arc::clone).ok()
}

/// Cache model backed by a tokio task-local.
#[derive(Debug)]
pub struct TaskLocalModel {
    id: u64,
}

impl TaskLocalModel {
    pub fn new() -> Self {
        Self {
            id: NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn frame_with(&self, dimension: &CacheDimension) -> Frame {
        let mut entries = current_frame()
            .map(|frame| (*frame).clone())
            .unwrap_or_default();
        entries.insert(self.id, dimension.clone());
        Arc::new(entries)
    }
}

impl Default for TaskLocalModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheModel for TaskLocalModel {
    fn enter_scope(&self, dimension: &CacheDimension, body: &mut dyn FnMut()) -> Result<(), CacheError> {
        FRAME.sync_scope(self.frame_with(dimension), body);
        Ok(())
    }

    fn enter_scope_async<'a>(
        &self,
        dimension: &CacheDimension,
        body: BoxFuture<'a, ()>,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        FRAME.scope(self.frame_with(dimension), body.map(Ok)).boxed()
    }

    fn current_override(&self) -> Option<CacheDimension> {
        current_frame().and_then(|frame| frame.get(&self.id).cloned())
    }
}

/// Runs `fut` with the caller's task-local overrides, typically around a
/// future handed to `tokio::spawn`.
pub fn propagate<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    match current_frame() {
        Some(frame) => Either::Left(FRAME.scope(frame, fut)),
        None => Either::Right(fut),
    }
}
