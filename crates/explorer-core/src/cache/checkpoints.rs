//! Ring of the most recent checkpoint events.
//!
//! Bounded by count with insertion-order eviction: the newest checkpoint is prepended and
//! the oldest one falls off once the bound is exceeded. Reads return a snapshot so
//! callers never hold the lock.

use parking_lot::RwLock;
use std::collections::VecDeque;
use tracing::trace;

use super::BoundedCacheError;
use crate::feed::types::CheckpointEvent;

/// Newest-first history of checkpoint events, deduplicated by anchor record id.
#[derive(Debug)]
pub struct CheckpointHistory {
    bound: usize,
    entries: RwLock<VecDeque<CheckpointEvent>>,
}

impl CheckpointHistory {
    /// # Errors
    ///
    /// Returns [`BoundedCacheError::InvalidCapacity`] if `bound` is zero.
    pub fn new(bound: usize) -> Result<Self, BoundedCacheError> {
        if bound == 0 {
            return Err(BoundedCacheError::InvalidCapacity(bound));
        }
        Ok(Self { bound, entries: RwLock::new(VecDeque::with_capacity(bound + 1)) })
    }

    /// Records `event` unless a checkpoint with the same anchor id is already present.
    ///
    /// Returns `true` if the event was new.
    pub fn insert(&self, event: CheckpointEvent) -> bool {
        let mut entries = self.entries.write();

        if entries.iter().any(|e| e.anchor_record_id == event.anchor_record_id) {
            trace!(anchor = %event.anchor_record_id, "duplicate checkpoint ignored");
            return false;
        }

        entries.push_front(event);
        while entries.len() > self.bound {
            entries.pop_back();
        }
        true
    }

    /// Snapshot of the history, newest first.
    #[must_use]
    pub fn recent(&self) -> Vec<CheckpointEvent> {
        self.entries.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn latest(&self) -> Option<CheckpointEvent> {
        self.entries.read().front().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
