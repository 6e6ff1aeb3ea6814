use std::collections::HashSet;
use std::hash::Hash;

use super::lru::LruCache;

/// LRU cache that keeps the current working set resident.
///
/// Setting the working set touches every member already present, moving
/// them to the most recently used end. On top of that, eviction skips
/// working-set members as long as another victim exists, so a visible tile
/// survives even when it is the least recently touched entry.
#[derive(Debug)]
pub struct WorkingSetCache<K, V> {
    lru: LruCache<K, V>,
    working_set: HashSet<K>,
}

impl<K: Hash + Eq + Clone, V> WorkingSetCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: LruCache::new(capacity),
            working_set: HashSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lru.capacity()
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.lru.contains_key(key)
    }

    /// Look up a key and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.lru.get(key)
    }

    /// Look up a key without touching its recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.lru.peek(key)
    }

    /// Insert an entry as most recently used, returning the displaced one.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        let mut evicted = None;
        if !self.lru.contains_key(&key) && self.lru.len() >= self.lru.capacity() {
            evicted = self.evict();
        }
        // Either a slot is free now or the key replaces its own entry
        self.lru.push(key, value).or(evicted)
    }

    /// Insert an entry as least recently used; see [`LruCache::push_cold`].
    pub fn put_cold(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.lru.push_cold(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.lru.remove(key)
    }

    /// Replace the working set and touch every member already cached.
    pub fn set_working_set(&mut self, keys: &HashSet<K>) {
        self.working_set = keys.clone();
        for key in keys {
            self.lru.get(key);
        }
    }

    pub fn working_set(&self) -> &HashSet<K> {
        &self.working_set
    }

    pub fn is_in_working_set(&self, key: &K) -> bool {
        self.working_set.contains(key)
    }

    /// Keys from the least to the most recently used.
    pub fn keys_lru(&self) -> impl Iterator<Item = &K> {
        self.lru.iter_lru().map(|(key, _)| key)
    }

    /// Entries from the least to the most recently used.
    pub fn iter_lru(&self) -> impl Iterator<Item = (&K, &V)> {
        self.lru.iter_lru()
    }

    /// Remove every entry, returning them from least to most recently used.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.lru.drain()
    }

    /// Evict the least recently used entry outside the working set, or the
    /// plain least recently used entry if every entry is in it.
    fn evict(&mut self) -> Option<(K, V)> {
        let victim = self
            .lru
            .iter_lru()
            .map(|(key, _)| key)
            .find(|key| !self.working_set.contains(*key))
            .cloned();

        match victim {
            Some(key) => {
                let value = self.lru.remove(&key)?;
                Some((key, value))
            }
            None => self.lru.pop_lru(),
        }
    }
}
