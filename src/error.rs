//! Error types for the memokit library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Returned by memoized calls, key-chain store writes and
//!   scope entry when a caching contract is broken.
//! - [`ConfigError`]: Returned when memoizer configuration parameters are
//!   invalid (e.g. a zero `limit`).
//!
//! ## Example Usage
//!
//! ```
//! use memokit::error::CacheError;
//! use memokit::memoize;
//!
//! // Only durable (value) arguments and no bypass: refused before `f` runs.
//! let double = memoize(|(n,): &(i64,)| n * 2);
//! assert!(matches!(double.call((2,)), Err(CacheError::MissingReclaimableKey { .. })));
//! ```

use thiserror::Error;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Error raised by the caching layer itself.
///
/// Errors produced by a wrapped function are never converted into this type;
/// they reach the caller untouched (see
/// [`MemoizeBuilder::build_fallible`](crate::builder::MemoizeBuilder::build_fallible)).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A write was attempted with a key chain made only of durable keys.
    #[error(
        "no reclaimable key found among {durable} durable key(s); pass an Arc argument, \
         configure a resolver, or enable allow_durable_only"
    )]
    MissingReclaimableKey { durable: usize },

    /// A configured resolver produced only durable selector values.
    #[error("resolver produced {produced} selector value(s), none of them reclaimable")]
    ResolverContract { produced: usize },

    /// A scope exit observed a different dimension on top of the stack.
    ///
    /// Usually caused by a scope body that entered another dimension of the
    /// same scope and never left it.
    #[error(
        "cache scope synchronization failed: expected dimension #{expected} on scope exit, \
         found {}",
        describe_found(.found)
    )]
    ScopeSynchronization { expected: u64, found: Option<u64> },

    /// A cache model returned from `enter_scope` without running the body.
    #[error("cache model returned without running the scoped body")]
    ScopeNotEntered,
}

fn describe_found(found: &Option<u64>) -> String {
    match found {
        Some(id) => format!("dimension #{id}"),
        None => "an empty stack".to_string(),
    }
}

impl CacheError {
    /// Returns `true` for errors signalling structural misuse of scopes.
    pub fn is_scope_error(&self) -> bool {
        matches!(
            self,
            CacheError::ScopeSynchronization { .. } | CacheError::ScopeNotEntered
        )
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when memoizer configuration parameters are invalid.
///
/// Produced by [`MemoizeBuilder::try_build`](crate::builder::MemoizeBuilder::try_build).
/// Carries a human-readable description of which parameter failed validation.
///
/// # Example
///
/// ```
/// use memokit::builder::MemoizeBuilder;
///
/// let err = MemoizeBuilder::new()
///     .limit(0)
///     .try_build(|(_k,): &(std::sync::Arc<u8>,)| 1)
///     .unwrap_err();
/// assert!(err.to_string().contains("limit"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
