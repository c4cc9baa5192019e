use std::collections::{HashMap, VecDeque};

use crate::data::Record;
use crate::types::RecordId;

/// Lookup strategy for a [`RecombinationCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStrategy {
    /// FIFO queue. For stages that keep input order but may drop records.
    OrderPreserving,
    /// Hash map. For stages that may reorder but return every record.
    Keyed,
}

impl CacheStrategy {
    /// Strategy matching a stage's filtering behavior.
    pub fn for_filtering(filtering: bool) -> Self {
        if filtering {
            CacheStrategy::OrderPreserving
        } else {
            CacheStrategy::Keyed
        }
    }
}

/// Store of original ("fat") records for one thin-execution round trip.
pub enum RecombinationCache<T> {
    /// FIFO queue of originals.
    OrderPreserving(VecDeque<T>),
    /// Originals keyed by identity.
    Keyed(HashMap<RecordId, T>),
}

impl<T: Record> RecombinationCache<T> {
    /// Empty cache using `strategy`.
    pub fn new(strategy: CacheStrategy) -> Self {
        match strategy {
            CacheStrategy::OrderPreserving => RecombinationCache::OrderPreserving(VecDeque::new()),
            CacheStrategy::Keyed => RecombinationCache::Keyed(HashMap::new()),
        }
    }

    /// Strategy of this cache.
    pub fn strategy(&self) -> CacheStrategy {
        match self {
            RecombinationCache::OrderPreserving(_) => CacheStrategy::OrderPreserving,
            RecombinationCache::Keyed(_) => CacheStrategy::Keyed,
        }
    }

    /// Store an original record under its identity.
    pub fn put(&mut self, record: T) {
        match self {
            RecombinationCache::OrderPreserving(queue) => queue.push_back(record),
            RecombinationCache::Keyed(map) => {
                map.insert(record.id(), record);
            }
        }
    }

    /// Remove and return the original for `id`.
    ///
    /// In order-preserving mode the queue is scanned from the front; entries
    /// ahead of the match were filtered out by the stage and are discarded. A
    /// miss leaves the queue untouched.
    pub fn take(&mut self, id: &RecordId) -> Option<T> {
        match self {
            RecombinationCache::OrderPreserving(queue) => {
                let pos = queue.iter().position(|record| record.id() == *id)?;
                queue.drain(..pos);
                queue.pop_front()
            }
            RecombinationCache::Keyed(map) => map.remove(id),
        }
    }

    /// Number of cached originals.
    pub fn len(&self) -> usize {
        match self {
            RecombinationCache::OrderPreserving(queue) => queue.len(),
            RecombinationCache::Keyed(map) => map.len(),
        }
    }

    /// Whether no originals are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
