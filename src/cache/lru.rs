//! Access-ordered cache over a slot arena.
//!
//! Entries live in a `Vec` of slots threaded into a doubly linked list by
//! index; a hash map points from key to slot. Freed slots are recycled
//! through a free list, so every operation is O(1) apart from hashing.
//!
//! ```text
//!  head (most recent)                         tail (least recent)
//!  ┌──────┐ next ┌──────┐ next ┌──────┐
//!  │ slot │ ───► │ slot │ ───► │ slot │
//!  └──────┘ ◄─── └──────┘ ◄─── └──────┘
//!           prev          prev
//! ```
//!
//! The cache never runs side effects itself: operations that drop an entry
//! hand it back, and the owner decides what releasing it means (dropping a
//! bitmap handle, deleting a file).

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
struct Slot<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-capacity least-recently-used cache.
#[derive(Debug)]
pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Slot<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A capacity of 0 is valid; such a cache never stores anything.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Check for a key without touching its recency.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Look up a key and mark it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = *self.map.get(key)?;
        self.detach(index);
        self.attach_front(index);
        self.slot(index).map(|slot| &slot.value)
    }

    /// Look up a key without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = *self.map.get(key)?;
        self.slot(index).map(|slot| &slot.value)
    }

    /// Insert an entry as most recently used.
    ///
    /// Returns the entry that had to leave: the previous value stored under
    /// the same key, or the evicted least recently used entry when the cache
    /// was full. With capacity 0 the new entry itself is returned.
    pub fn push(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.insert(key, value, true)
    }

    /// Insert an entry as least recently used.
    ///
    /// An existing key has its value replaced in place without changing its
    /// recency. When the cache is full the new entry is handed back instead
    /// of evicting anything, since it would be the next victim anyway.
    pub fn push_cold(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.insert(key, value, false)
    }

    /// Remove an entry.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.map.remove(key)?;
        self.release(index).map(|(_, value)| value)
    }

    /// Remove and return the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let index = self.tail?;
        let (key, value) = self.release(index)?;
        self.map.remove(&key);
        Some((key, value))
    }

    /// Key of the least recently used entry.
    pub fn peek_lru(&self) -> Option<&K> {
        self.tail
            .and_then(|index| self.slot(index))
            .map(|slot| &slot.key)
    }

    /// Iterate from the least to the most recently used entry.
    pub fn iter_lru(&self) -> IterLru<'_, K, V> {
        IterLru {
            cache: self,
            next: self.tail,
        }
    }

    /// Remove every entry, returning them from least to most recently used.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut entries = Vec::with_capacity(self.len());
        while let Some(entry) = self.pop_lru() {
            entries.push(entry);
        }
        self.slots.clear();
        self.free.clear();
        entries
    }

    fn insert(&mut self, key: K, value: V, hot: bool) -> Option<(K, V)> {
        if self.capacity == 0 {
            return Some((key, value));
        }

        if let Some(&index) = self.map.get(&key) {
            let slot = self.slots[index].as_mut()?;
            let old_value = std::mem::replace(&mut slot.value, value);
            let old_key = std::mem::replace(&mut slot.key, key);
            if hot {
                self.detach(index);
                self.attach_front(index);
            }
            return Some((old_key, old_value));
        }

        let mut displaced = None;
        if self.map.len() >= self.capacity {
            if !hot {
                return Some((key, value));
            }
            displaced = self.pop_lru();
        }

        let slot = Slot {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.map.insert(key, index);

        if hot {
            self.attach_front(index);
        } else {
            self.attach_back(index);
        }
        displaced
    }

    fn slot(&self, index: usize) -> Option<&Slot<K, V>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Unlink a slot and return its entry; the slot goes to the free list.
    fn release(&mut self, index: usize) -> Option<(K, V)> {
        self.detach(index);
        let slot = self.slots.get_mut(index)?.take()?;
        self.free.push(index);
        Some((slot.key, slot.value))
    }

    fn detach(&mut self, index: usize) {
        let (prev, next) = match self.slot(index) {
            Some(slot) => (slot.prev, slot.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(slot) = self.slots[p].as_mut() {
                    slot.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(slot) = self.slots[n].as_mut() {
                    slot.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(slot) = self.slots[index].as_mut() {
            slot.prev = None;
            slot.next = None;
        }
    }

    fn attach_front(&mut self, index: usize) {
        let old_head = self.head;
        if let Some(slot) = self.slots[index].as_mut() {
            slot.prev = None;
            slot.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(slot) = self.slots[h].as_mut() {
                    slot.prev = Some(index);
                }
            }
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    fn attach_back(&mut self, index: usize) {
        let old_tail = self.tail;
        if let Some(slot) = self.slots[index].as_mut() {
            slot.prev = old_tail;
            slot.next = None;
        }
        match old_tail {
            Some(t) => {
                if let Some(slot) = self.slots[t].as_mut() {
                    slot.next = Some(index);
                }
            }
            None => self.head = Some(index),
        }
        self.tail = Some(index);
    }
}

/// Iterator from the least to the most recently used entry.
pub struct IterLru<'a, K, V> {
    cache: &'a LruCache<K, V>,
    next: Option<usize>,
}

impl<'a, K: Hash + Eq + Clone, V> Iterator for IterLru<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cache.slot(self.next?)?;
        self.next = slot.prev;
        Some((&slot.key, &slot.value))
    }
}
