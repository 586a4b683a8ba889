//! # Lazy Cache
//!
//! Read-mostly map from key to a lazily computed, shared value.
//!
//! Lookups take the read lock. A miss releases it, takes the write lock and
//! looks again before computing, so concurrent misses on the same key compute
//! the value once. Computation runs under the write lock and must not call
//! back into the same cache.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug)]
pub struct LazyCache<K, V> {
    entries: RwLock<HashMap<K, Arc<V>>>,
}

impl<K, V> Default for LazyCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> LazyCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.read().get(key).cloned()
    }

    /// Return the cached value for `key`, computing it with `init` on first use
    pub fn get_or_insert_with(&self, key: &K, init: impl FnOnce(&K) -> V) -> Arc<V> {
        match self.try_get_or_insert_with(key, |k| Ok::<_, std::convert::Infallible>(init(k))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_insert_with`](Self::get_or_insert_with) for fallible
    /// initializers. Failures are not cached.
    pub fn try_get_or_insert_with<E>(
        &self,
        key: &K,
        init: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(value) = self.entries.read().get(key) {
            return Ok(Arc::clone(value));
        }

        let mut entries = self.entries.write();
        // Another caller may have filled the entry between the two locks
        if let Some(value) = entries.get(key) {
            return Ok(Arc::clone(value));
        }

        let value = Arc::new(init(key)?);
        entries.insert(key.clone(), Arc::clone(&value));
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
