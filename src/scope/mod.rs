//! Named scopes and their cache models.
//!
//! Every memoizer belongs to one [`Scope`] (default: [`Scope::DEFAULT`]).
//! Each scope name lazily gets its own [`CacheModel`], a [`StackModel`]
//! unless [`configure_cache_model`] installed another one. Overrides entered
//! in one scope are invisible to memoizers of every other scope.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use memokit::scope::{Scope, scope_model};
//! use memokit::store::CacheDimension;
//!
//! let model = scope_model(&Scope::new("docs"));
//! let dim = CacheDimension::new();
//! let seen = model.create_scope(&dim, || model.current_override()).unwrap();
//! assert_eq!(seen, Some(dim));
//! assert!(Arc::ptr_eq(&model, &scope_model(&Scope::new("docs"))));
//! ```

pub mod stack;
#[cfg(feature = "task-local")]
pub mod task_local;

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

pub use stack::StackModel;
#[cfg(feature = "task-local")]
pub use task_local::{TaskLocalModel, propagate};

use crate::traits::CacheModel;

/// Name of a scope family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope(Cow<'static, str>);

impl Scope {
    pub const DEFAULT: Scope = Scope(Cow::Borrowed("default"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<&'static str> for Scope {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for Scope {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static MODELS: LazyLock<RwLock<FxHashMap<Scope, Arc<dyn CacheModel>>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

/// Model serving `scope`, created on first use.
pub fn scope_model(scope: &Scope) -> Arc<dyn CacheModel> {
    if let Some(model) = MODELS.read().get(scope) {
        return Arc::clone(model);
    }
    let mut models = MODELS.write();
    Arc::clone(models.entry(scope.clone()).or_insert_with(|| {
        tracing::debug!(%scope, "creating stack cache model");
        Arc::new(StackModel::new())
    }))
}

/// Replaces the model serving `scope`, returning the previous one.
///
/// Overrides entered through the previous model stay invisible to calls
/// made after the swap; configure models before entering scopes.
pub fn configure_cache_model(
    scope: impl Into<Scope>,
    model: Arc<dyn CacheModel>,
) -> Option<Arc<dyn CacheModel>> {
    let scope = scope.into();
    tracing::debug!(%scope, ?model, "cache model configured");
    MODELS.write().insert(scope, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CacheDimension;

    #[test]
    fn scope_names_compare_by_content() {
        assert_eq!(Scope::from("a"), Scope::from(String::from("a")));
        assert_eq!(Scope::default(), Scope::DEFAULT);
        assert_eq!(Scope::DEFAULT.name(), "default");
    }

    #[test]
    fn each_scope_gets_its_own_model() {
        let a = scope_model(&Scope::new("scope-mod-a"));
        let b = scope_model(&Scope::new("scope-mod-b"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &scope_model(&Scope::new("scope-mod-a"))));

        let dim = CacheDimension::new();
        a.create_scope(&dim, || assert_eq!(b.current_override(), None))
            .unwrap();
    }

    #[test]
    fn configure_replaces_model() {
        let scope = Scope::new("scope-mod-configured");
        let first = scope_model(&scope);
        let replacement: Arc<dyn CacheModel> = Arc::new(StackModel::new());
        let previous = configure_cache_model(scope.clone(), Arc::clone(&replacement));
        assert!(Arc::ptr_eq(&previous.unwrap(), &first));
        assert!(Arc::ptr_eq(&scope_model(&scope), &replacement));
    }
}
