//! Process-wide default store
//!
//! Applications should construct a [`Store`] and pass it around. This shim
//! exists for small tools that want one shared instance without plumbing.

use std::sync::OnceLock;

use crate::store::Store;

static DEFAULT_STORE: OnceLock<Store> = OnceLock::new();

/// The lazily created process-wide store
///
/// Every call returns a handle to the same state.
pub fn default_store() -> &'static Store {
    DEFAULT_STORE.get_or_init(Store::new)
}
