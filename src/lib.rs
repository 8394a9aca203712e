//! memokit: weak-keyed memoization with dynamically scoped cache dimensions.
//!
//! A memoized function keeps its results in a [`KeyChainStore`], a trie
//! keyed by the call's arguments. Arguments held in an `Arc` are
//! *reclaimable*: the store keeps only a weak reference to them, so entries
//! vanish once the caller drops its last `Arc`. Primitive arguments are
//! *durable* and bounded only by an optional per-level `limit`.
//!
//! ```text
//!   memoize(f) ──► Memoized ──► scope model ──► override dimension's store?
//!                     │                               │ no
//!                     │                               ▼
//!                     └──────────────────────► own KeyChainStore
//! ```
//!
//! Scopes redirect every memoized call made inside them to a private
//! [`CacheDimension`] without changing any signature ([`isolate`], [`fork`],
//! [`nested_box`]). [`reset`] invalidates everything at once.
//!
//! ```
//! use std::sync::Arc;
//!
//! use memokit::{isolate, memoize};
//!
//! let summary = memoize(|(text,): &(Arc<String>,)| Arc::new(text.to_uppercase()));
//! let text = Arc::new(String::from("hello"));
//!
//! let first = summary.call((Arc::clone(&text),)).unwrap();
//! assert!(Arc::ptr_eq(&first, &summary.call((Arc::clone(&text),)).unwrap()));
//!
//! let isolated = isolate(|| summary.call((Arc::clone(&text),)).unwrap()).unwrap();
//! assert!(!Arc::ptr_eq(&first, &isolated));
//! ```
//!
//! See `DESIGN.md` for internal architecture and invariants.

pub mod builder;
pub mod combinators;
pub mod ds;
pub mod error;
pub mod generation;
pub mod key;
pub mod memoizer;
pub mod prelude;
pub mod scope;
pub mod store;
pub mod traits;

pub use builder::MemoizeBuilder;
pub use combinators::{
    Boxed, ForkOptions, Forked, IsolateOptions, NestedBoxed, boxed, fork, isolate, isolate_async,
    isolate_with, nested_box, nested_box_in,
};
pub use error::{CacheError, ConfigError};
pub use generation::{generation, reset};
pub use key::{Anchor, Argument, Arguments, Key, Value};
pub use memoizer::{MemoMetrics, Memoized, Resolver, TryMemoized, memoize};
pub use scope::{Scope, configure_cache_model, scope_model};
pub use store::{CacheDimension, KeyChainStore};
