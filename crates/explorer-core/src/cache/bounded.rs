//! Fixed-capacity LRU cache.
//!
//! Entries live in a slab (`Vec<Option<Node>>`) and are threaded into a doubly linked
//! list by index, ordered most-recently-used (head) to least-recently-used (tail). A hash
//! index maps each key to its slab slot, giving O(1) `get` and `put`.
//!
//! Freed slots are recycled through a free list, so the slab never grows beyond
//! `capacity` slots.

use ahash::RandomState;
use std::{collections::HashMap, hash::Hash};
use thiserror::Error;

/// Errors that occur during bounded cache construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoundedCacheError {
    /// Capacity must be at least one entry.
    #[error("Invalid cache capacity: {0} (must be greater than 0)")]
    InvalidCapacity(usize),
}

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Generic LRU store with a capacity fixed at construction.
///
/// Both [`get`](Self::get) and [`put`](Self::put) promote the touched entry to the head.
/// When a new key is inserted into a full cache the tail entry is evicted first.
///
/// Not internally synchronized: owners that share a cache across tasks wrap it in a
/// lock (see [`RecordMetadataCache`](super::RecordMetadataCache)).
///
/// # Example
///
/// ```
/// use explorer_core::cache::BoundedCache;
///
/// let mut cache = BoundedCache::new(2).unwrap();
/// cache.put("a", 1);
/// cache.put("b", 2);
/// cache.get(&"a");
/// cache.put("c", 3); // evicts "b", the least recently used
///
/// assert!(cache.get(&"b").is_none());
/// assert_eq!(cache.get(&"a"), Some(&1));
/// ```
pub struct BoundedCache<K, V> {
    capacity: usize,
    slots: Vec<Option<Node<K, V>>>,
    free_slots: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: HashMap<K, usize, RandomState>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty cache holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns [`BoundedCacheError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, BoundedCacheError> {
        if capacity == 0 {
            return Err(BoundedCacheError::InvalidCapacity(capacity));
        }

        Ok(Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            free_slots: Vec::new(),
            head: None,
            tail: None,
            index: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        })
    }

    /// Looks up `key` and promotes it to most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.promote(idx);
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// Looks up `key` without touching its recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Inserts or overwrites `key`, promoting it to most-recently-used.
    ///
    /// Returns the entry evicted to make room, if any. Overwriting an existing key never
    /// evicts.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.index.get(&key) {
            if let Some(node) = self.slots[idx].as_mut() {
                node.value = value;
            }
            self.promote(idx);
            return None;
        }

        let evicted = if self.index.len() >= self.capacity { self.evict_tail() } else { None };

        let idx = self.alloc_slot(Node { key: key.clone(), value, prev: None, next: None });
        self.link_at_head(idx);
        self.index.insert(key, idx);

        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates entries from most- to least-recently-used without promoting them.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter { cache: self, current: self.head }
    }

    /// Moves `idx` to the head. No-op if it already is the head.
    fn promote(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.link_at_head(idx);
    }

    /// Detaches `idx` from the list, repairing `head`/`tail` as needed.
    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.slots[idx].as_ref().map(|node| (node.prev, node.next)) else {
            return;
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.slots[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn link_at_head(&mut self, idx: usize) {
        let old_head = self.head;

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }

        match old_head {
            Some(h) => {
                if let Some(node) = self.slots[h].as_mut() {
                    node.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }

        self.head = Some(idx);
    }

    fn evict_tail(&mut self) -> Option<(K, V)> {
        let tail = self.tail?;
        self.unlink(tail);

        let node = self.slots[tail].take()?;
        self.free_slots.push(tail);
        self.index.remove(&node.key);

        Some((node.key, node.value))
    }

    fn alloc_slot(&mut self, node: Node<K, V>) -> usize {
        if let Some(idx) = self.free_slots.pop() {
            self.slots[idx] = Some(node);
            idx
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }
}

impl<K, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("capacity", &self.capacity)
            .field("len", &self.index.len())
            .finish_non_exhaustive()
    }
}

/// Iterator over a [`BoundedCache`] from most- to least-recently-used.
pub struct Iter<'a, K, V> {
    cache: &'a BoundedCache<K, V>,
    current: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.current?;
        let node = self.cache.slots[idx].as_ref()?;
        self.current = node.next;
        Some((&node.key, &node.value))
    }
}
