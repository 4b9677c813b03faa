//! Record metadata cache.
//!
//! Maps record ids to their latest status snapshot. Notifications for the same record are
//! shallow-merged: a new entry is built from the old one with only the fields present in
//! the notification overwritten, then swapped in whole. Readers hold an `Arc` to a
//! complete entry and never observe a half-applied merge.
//!
//! # Bounding
//!
//! The default [`MetadataEvictionPolicy::InsertionOrder`] keeps the insert path O(1) and
//! enforces the budget in [`trim`](RecordMetadataCache::trim), which the distributor runs
//! on a timer. Between trims the cache may exceed the budget; after a trim it never does.
//!
//! [`MetadataEvictionPolicy::Lru`] stores entries in a [`BoundedCache`] sized to the
//! budget, so the bound holds on every insert and `trim` has nothing to do.

use ahash::RandomState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::debug;

use super::{BoundedCache, BoundedCacheError};
use crate::feed::types::{RecordMetadataEntry, RecordMetadataUpdate};

/// Eviction policy used to keep the metadata cache within budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataEvictionPolicy {
    /// Oldest inserted record first, applied by the periodic trim.
    #[default]
    InsertionOrder,
    /// Least recently merged or read record first, applied on insert.
    Lru,
}

enum Store {
    InsertionOrder {
        entries: HashMap<String, Arc<RecordMetadataEntry>, RandomState>,
        order: VecDeque<String>,
    },
    Lru(BoundedCache<String, Arc<RecordMetadataEntry>>),
}

pub struct RecordMetadataCache {
    budget: usize,
    policy: MetadataEvictionPolicy,
    store: Mutex<Store>,
    evictions: AtomicU64,
}

impl RecordMetadataCache {
    /// # Errors
    ///
    /// Returns [`BoundedCacheError::InvalidCapacity`] if `budget` is zero.
    pub fn new(budget: usize, policy: MetadataEvictionPolicy) -> Result<Self, BoundedCacheError> {
        if budget == 0 {
            return Err(BoundedCacheError::InvalidCapacity(budget));
        }

        let store = match policy {
            MetadataEvictionPolicy::InsertionOrder => Store::InsertionOrder {
                entries: HashMap::with_hasher(RandomState::new()),
                order: VecDeque::new(),
            },
            MetadataEvictionPolicy::Lru => Store::Lru(BoundedCache::new(budget)?),
        };

        Ok(Self { budget, policy, store: Mutex::new(store), evictions: AtomicU64::new(0) })
    }

    /// Shallow-merges `update` into the cached entry for its record and returns the merged
    /// entry. A record seen for the first time starts from an all-default entry.
    pub fn merge(&self, update: &RecordMetadataUpdate) -> Arc<RecordMetadataEntry> {
        let mut store = self.store.lock();

        match &mut *store {
            Store::InsertionOrder { entries, order } => {
                let merged = Arc::new(match entries.get(&update.record_id) {
                    Some(current) => current.merged_with(update),
                    None => {
                        order.push_back(update.record_id.clone());
                        RecordMetadataEntry::new(update.record_id.as_str()).merged_with(update)
                    }
                });
                entries.insert(update.record_id.clone(), Arc::clone(&merged));
                merged
            }
            Store::Lru(cache) => {
                let merged = Arc::new(match cache.get(&update.record_id) {
                    Some(current) => current.merged_with(update),
                    None => RecordMetadataEntry::new(update.record_id.as_str()).merged_with(update),
                });
                if cache.put(update.record_id.clone(), Arc::clone(&merged)).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                merged
            }
        }
    }

    #[must_use]
    pub fn get(&self, record_id: &str) -> Option<Arc<RecordMetadataEntry>> {
        let mut store = self.store.lock();
        match &mut *store {
            Store::InsertionOrder { entries, .. } => entries.get(record_id).cloned(),
            Store::Lru(cache) => cache.get(&record_id.to_string()).cloned(),
        }
    }

    /// Removes entries oldest-inserted first until the cache is within budget.
    ///
    /// Returns the number of entries removed.
    pub fn trim(&self) -> usize {
        let mut store = self.store.lock();

        let Store::InsertionOrder { entries, order } = &mut *store else {
            return 0;
        };

        let mut removed = 0;
        while entries.len() > self.budget {
            let Some(oldest) = order.pop_front() else { break };
            if entries.remove(&oldest).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, remaining = entries.len(), budget = self.budget, "trimmed metadata cache");
        }

        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &*self.store.lock() {
            Store::InsertionOrder { entries, .. } => entries.len(),
            Store::Lru(cache) => cache.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    #[must_use]
    pub fn policy(&self) -> MetadataEvictionPolicy {
        self.policy
    }

    /// Total entries evicted since construction, by trim or by LRU replacement.
    #[must_use]
    pub fn eviction_count(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for RecordMetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordMetadataCache")
            .field("budget", &self.budget)
            .field("policy", &self.policy)
            .field("len", &self.len())
            .finish()
    }
}
