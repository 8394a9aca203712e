//! Memoizer builder.
//!
//! Collects the options of one memoized function, validates them and wraps
//! the function.
//!
//! | Option               | Default              | Effect                                         |
//! |----------------------|----------------------|------------------------------------------------|
//! | `resolver`           | process-wide marker  | selector keys placed in front of the arguments |
//! | `limit`              | unbounded            | capacity of each durable-key level             |
//! | `allow_durable_only` | `false`              | accept calls without a reclaimable key         |
//! | `serializer`         | [`Identity`]         | transform on write and on hit                  |
//! | `scope`              | [`Scope::DEFAULT`]   | scope family whose overrides apply             |
//! | `coerce_positions`   | none                 | compare these positions by content             |
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use memokit::builder::MemoizeBuilder;
//!
//! let page = MemoizeBuilder::new()
//!     .limit(64)
//!     .scope("GLOBAL")
//!     .build(|(doc, n): &(Arc<Vec<String>>, usize)| doc.get(*n).cloned());
//!
//! let doc = Arc::new(vec!["a".to_string(), "b".to_string()]);
//! assert_eq!(page.call((Arc::clone(&doc), 1)).unwrap(), Some("b".to_string()));
//! ```

use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::error::{CacheError, ConfigError};
use crate::key::{Arguments, Key};
use crate::memoizer::{MemoOptions, Memoized, TryMemoized};
use crate::scope::Scope;
use crate::traits::{Identity, Serializer};

/// Builder for [`Memoized`] and [`TryMemoized`] functions.
#[derive(Debug, Clone)]
pub struct MemoizeBuilder<Z = Identity> {
    options: MemoOptions,
    limit: Option<usize>,
    serializer: Z,
}

impl MemoizeBuilder {
    pub fn new() -> Self {
        Self {
            options: MemoOptions::default(),
            limit: None,
            serializer: Identity,
        }
    }
}

impl Default for MemoizeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<Z> MemoizeBuilder<Z> {
    /// Selector keys computed per call. At least one must be reclaimable.
    pub fn resolver(mut self, resolver: impl Fn() -> Vec<Key> + Send + Sync + 'static) -> Self {
        self.options.resolver = Some(Arc::new(resolver));
        self
    }

    /// Maximum number of durable keys per trie level. Must be at least 1.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn allow_durable_only(mut self, allow: bool) -> Self {
        self.options.allow_durable_only = allow;
        self
    }

    pub fn scope(mut self, scope: impl Into<Scope>) -> Self {
        self.options.scope = scope.into();
        self
    }

    /// Argument positions keyed by their content instead of identity.
    ///
    /// Shared strings and primitives compare by value at these positions.
    /// Arguments without a content form keep their identity key. The function
    /// still receives the original arguments.
    pub fn coerce_positions(mut self, positions: impl IntoIterator<Item = usize>) -> Self {
        self.options.coerce = positions.into_iter().collect();
        self
    }

    pub fn serializer<Z2>(self, serializer: Z2) -> MemoizeBuilder<Z2> {
        MemoizeBuilder {
            options: self.options,
            limit: self.limit,
            serializer,
        }
    }

    fn validated(self) -> Result<(MemoOptions, Z), ConfigError> {
        let mut options = self.options;
        options.limit = match self.limit {
            None => None,
            Some(limit) => Some(
                NonZeroUsize::new(limit).ok_or_else(|| ConfigError::new("limit must be >= 1"))?,
            ),
        };
        options.coerce.sort_unstable();
        options.coerce.dedup();
        Ok((options, self.serializer))
    }

    /// Wraps `f`, validating the configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when `limit` is zero.
    pub fn try_build<A, R, F>(self, f: F) -> Result<Memoized<A, R, F, Z>, ConfigError>
    where
        A: Arguments,
        F: Fn(&A) -> R,
        Z: Serializer<R>,
    {
        let (options, serializer) = self.validated()?;
        Ok(Memoized::from_parts(f, serializer, options))
    }

    /// Wraps `f`.
    ///
    /// # Panics
    ///
    /// Panics when the configuration is invalid; see [`try_build`](Self::try_build).
    pub fn build<A, R, F>(self, f: F) -> Memoized<A, R, F, Z>
    where
        A: Arguments,
        F: Fn(&A) -> R,
        Z: Serializer<R>,
    {
        match self.try_build(f) {
            Ok(memoized) => memoized,
            Err(err) => panic!("invalid memoizer configuration: {err}"),
        }
    }

    /// Wraps a fallible `f`; see [`TryMemoized`].
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when `limit` is zero.
    pub fn try_build_fallible<A, R, E, F>(self, f: F) -> Result<TryMemoized<A, R, E, F, Z>, ConfigError>
    where
        A: Arguments,
        E: From<CacheError>,
        F: Fn(&A) -> Result<R, E>,
        Z: Serializer<R>,
    {
        let (options, serializer) = self.validated()?;
        Ok(TryMemoized::from_parts(f, serializer, options))
    }

    /// Wraps a fallible `f`.
    ///
    /// # Panics
    ///
    /// Panics when the configuration is invalid.
    pub fn build_fallible<A, R, E, F>(self, f: F) -> TryMemoized<A, R, E, F, Z>
    where
        A: Arguments,
        E: From<CacheError>,
        F: Fn(&A) -> Result<R, E>,
        Z: Serializer<R>,
    {
        match self.try_build_fallible(f) {
            Ok(memoized) => memoized,
            Err(err) => panic!("invalid memoizer configuration: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_is_rejected() {
        let err = MemoizeBuilder::new()
            .limit(0)
            .try_build(|(_k,): &(Arc<()>,)| ())
            .unwrap_err();
        assert_eq!(err.message(), "limit must be >= 1");
    }

    #[test]
    #[should_panic(expected = "invalid memoizer configuration")]
    fn build_panics_on_zero_limit() {
        let _ = MemoizeBuilder::new().limit(0).build(|(_k,): &(Arc<()>,)| ());
    }

    #[test]
    fn options_are_carried_into_memoizer() {
        let f = MemoizeBuilder::new()
            .scope("builder-test")
            .coerce_positions([2, 0, 2])
            .build(|(_k,): &(Arc<()>,)| ());
        assert_eq!(f.scope().name(), "builder-test");
    }

    #[test]
    fn validated_normalises_options() {
        let (options, _) = MemoizeBuilder::new()
            .limit(3)
            .coerce_positions([2, 0, 2])
            .validated()
            .unwrap();
        assert_eq!(options.limit, NonZeroUsize::new(3));
        assert_eq!(options.coerce, vec![0, 2]);
    }
}
