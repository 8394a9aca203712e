pub use crate::builder::MemoizeBuilder;
pub use crate::combinators::{
    ForkOptions, IsolateOptions, boxed, fork, isolate, isolate_async, isolate_with, nested_box,
    nested_box_in,
};
pub use crate::error::{CacheError, ConfigError};
pub use crate::generation::reset;
pub use crate::key::{Anchor, Argument, Arguments, Key, Value};
pub use crate::memoizer::{Memoized, TryMemoized, memoize};
pub use crate::scope::{Scope, StackModel, configure_cache_model, scope_model};
#[cfg(feature = "task-local")]
pub use crate::scope::{TaskLocalModel, propagate};
pub use crate::store::{CacheDimension, KeyChainStore, WriteOptions};
pub use crate::traits::{CacheModel, Identity, Serializer, SerializerFn};
