//! Process-wide lazy cache of loaded backends.
//!
//! [`LazyRegistry`] holds at most one value per key. The first
//! [`get_or_load`](LazyRegistry::get_or_load) for a key runs the loader;
//! later calls share the published `Arc`.
//!
//! # Locking
//!
//! ```text
//! slots: Mutex<HashMap<K, Arc<Slot>>>     held only to find or create a slot
//! Slot:  Mutex<Option<Arc<V>>>            held for the duration of a load
//! ```
//!
//! Concurrent callers for one key queue on that key's slot and the load
//! runs once. Callers for different keys never wait on each other's loads.
//! A value is stored only after its loader returns `Ok`, so nobody observes
//! a half-built value. Failed loads store nothing and the next call retries.
//! Entries are never evicted.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Slot<V> = Mutex<Option<Arc<V>>>;

pub struct LazyRegistry<K, V> {
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> LazyRegistry<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<K, Arc<Slot<V>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, key: &K) -> Arc<Slot<V>> {
        self.slots()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Return the cached value for `key`, loading it first if needed.
    pub fn get_or_load<E, F>(&self, key: &K, load: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = guard.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(load()?);
        *guard = Some(Arc::clone(&value));
        Ok(value)
    }

    /// The cached value, if one has been published. Never loads.
    ///
    /// Blocks while a load for `key` is in progress.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let slot = self.slots().get(key).cloned()?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }

    /// Keys with a published value.
    pub fn loaded_keys(&self) -> Vec<K> {
        let slots: Vec<(K, Arc<Slot<V>>)> = self
            .slots()
            .iter()
            .map(|(k, s)| (k.clone(), Arc::clone(s)))
            .collect();
        slots
            .into_iter()
            .filter(|(_, s)| match s.try_lock() {
                Ok(guard) => guard.is_some(),
                Err(std::sync::TryLockError::Poisoned(p)) => p.into_inner().is_some(),
                Err(std::sync::TryLockError::WouldBlock) => false,
            })
            .map(|(k, _)| k)
            .collect()
    }

    /// Number of published values.
    pub fn len(&self) -> usize {
        self.loaded_keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for LazyRegistry<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
