//! Storage for memoized results.
//!
//! - [`KeyChainStore`]: trie keyed by chains of reclaimable and durable keys.
//! - [`CacheDimension`]: a family of per-function stores, used as a scope
//!   override.

pub mod dimension;
pub mod key_chain;
pub(crate) mod reclaimable;

pub use dimension::{AnyStore, CacheDimension, SharedStore};
pub use key_chain::{KeyChainStore, StoreStats, WriteOptions};
