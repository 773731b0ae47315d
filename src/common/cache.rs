//! In-memory registry for storing key-value pairs.
//!
//! Uses moka's high-performance concurrent cache implementation, built
//! without capacity or expiration so entries are never evicted.

use moka::sync::Cache;

/// Thread-safe in-memory map.
///
/// Used for storing deployed workflow definitions
/// (`MemCache<String, Arc<WorkflowDefinition>>`), keyed by `name@version`.
/// Running executions resolve their definition through it on every message,
/// so an entry must stay until the process exits.
#[derive(Clone)]
pub struct MemCache<K, V> {
    entries: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`] that never evicts.
    pub fn unbounded() -> Self {
        Self {
            entries: Cache::builder().build(),
        }
    }

    /// Set an entry.
    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key, value);
    }

    /// Get an entry through key `&K`.
    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.get(key)
    }

    /// Inserts `value` unless `key` is already present, atomically.
    ///
    /// Returns the stored value and whether this call inserted it.
    pub fn get_or_insert(
        &self,
        key: K,
        value: V,
    ) -> (V, bool) {
        let entry = self.entries.entry(key).or_insert(value);
        let inserted = entry.is_fresh();
        (entry.into_value(), inserted)
    }
}
