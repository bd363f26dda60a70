//! Weighted LRU cache with single-flight loading.
//!
//! Entries live in an `IndexMap` ordered from least to most recently used. A
//! hit moves the entry to the back; inserting past the weight budget evicts
//! from the front. A miss installs a `Loading` marker so concurrent requests
//! for the same key wait for the first loader instead of loading again.
//! Invalidating a key mid-load marks the marker stale: the loader still gets
//! its value, but the value is never installed.

use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};

use crate::errors::LsifResult;

enum Entry<V> {
    Ready { value: Arc<V>, weight: usize },
    Loading { stale: bool },
}

struct CacheState<K, V> {
    entries: IndexMap<K, Entry<V>>,
    weight: usize,
}

pub struct LoadingCache<K, V> {
    capacity: usize,
    weigher: fn(&V) -> usize,
    state: Mutex<CacheState<K, V>>,
    loaded: Condvar,
}

impl<K, V> LoadingCache<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new(capacity: usize, weigher: fn(&V) -> usize) -> Self {
        Self {
            capacity: capacity.max(1),
            weigher,
            state: Mutex::new(CacheState {
                entries: IndexMap::new(),
                weight: 0,
            }),
            loaded: Condvar::new(),
        }
    }

    /// Return the cached value for `key`, running `load` on a miss.
    ///
    /// If the loader fails (or unwinds), the marker is removed and one waiter
    /// retries the load itself.
    pub fn get_or_load<F>(&self, key: K, load: F) -> LsifResult<Arc<V>>
    where
        F: FnOnce() -> LsifResult<V>,
    {
        {
            let mut state = self.state.lock();
            loop {
                match state.entries.get(&key) {
                    Some(Entry::Ready { .. }) => {
                        // Move to end for LRU
                        if let Some(entry) = state.entries.shift_remove(&key) {
                            let value = match &entry {
                                Entry::Ready { value, .. } => Some(Arc::clone(value)),
                                Entry::Loading { .. } => None,
                            };
                            state.entries.insert(key.clone(), entry);
                            if let Some(value) = value {
                                return Ok(value);
                            }
                        }
                    }
                    Some(Entry::Loading { .. }) => self.loaded.wait(&mut state),
                    None => {
                        state.entries.insert(key.clone(), Entry::Loading { stale: false });
                        break;
                    }
                }
            }
        }

        let pending = PendingLoad {
            cache: self,
            key: Some(key),
        };
        let value = load()?;
        Ok(pending.complete(value))
    }

    /// Drop every entry whose key matches. A matching in-flight load is
    /// marked stale so its result is not cached.
    pub fn invalidate<P>(&self, mut predicate: P)
    where
        P: FnMut(&K) -> bool,
    {
        let mut state = self.state.lock();
        let mut released = 0;
        state.entries.retain(|key, entry| {
            if !predicate(key) {
                return true;
            }
            match entry {
                Entry::Ready { weight, .. } => {
                    released += *weight;
                    false
                }
                Entry::Loading { stale } => {
                    *stale = true;
                    true
                }
            }
        });
        state.weight -= released;
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|entry| matches!(entry, Entry::Ready { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn weight(&self) -> usize {
        self.state.lock().weight
    }

    pub fn contains(&self, key: &K) -> bool {
        matches!(self.state.lock().entries.get(key), Some(Entry::Ready { .. }))
    }

    fn evict_over_capacity(&self, state: &mut CacheState<K, V>) {
        // The newest entry sits at the back and is never evicted here.
        let mut index = 0;
        while state.weight > self.capacity && index + 1 < state.entries.len() {
            match state.entries.get_index(index) {
                Some((_, Entry::Ready { weight, .. })) => {
                    let weight = *weight;
                    state.entries.shift_remove_index(index);
                    state.weight -= weight;
                }
                _ => index += 1,
            }
        }
    }
}

/// Owns the `Loading` marker for one key until the load completes.
struct PendingLoad<'a, K, V>
where
    K: Hash + Eq + Clone,
{
    cache: &'a LoadingCache<K, V>,
    key: Option<K>,
}

impl<K, V> PendingLoad<'_, K, V>
where
    K: Hash + Eq + Clone,
{
    fn complete(mut self, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let weight = (self.cache.weigher)(&value);
        if let Some(key) = self.key.take() {
            let mut state = self.cache.state.lock();
            let marker = state.entries.shift_remove(&key);
            if matches!(marker, Some(Entry::Loading { stale: true })) {
                drop(state);
                self.cache.loaded.notify_all();
                return value;
            }
            state.entries.insert(
                key,
                Entry::Ready {
                    value: Arc::clone(&value),
                    weight,
                },
            );
            state.weight += weight;
            self.cache.evict_over_capacity(&mut state);
        }
        self.cache.loaded.notify_all();
        value
    }
}

impl<K, V> Drop for PendingLoad<'_, K, V>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let mut state = self.cache.state.lock();
            if matches!(state.entries.get(&key), Some(Entry::Loading { .. })) {
                state.entries.shift_remove(&key);
            }
            drop(state);
            self.cache.loaded.notify_all();
        }
    }
}
