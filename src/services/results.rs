//! Fixed-capacity cache of completed job results.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::models::{JobKey, JobResult};

/// How many completed jobs are retained by default.
pub const DEFAULT_CACHE_CAPACITY: usize = 3;

/// Keyed, insertion-ordered cache. A result with a key already present
/// replaces the old entry in place; otherwise the oldest entry is evicted
/// once the cache is full.
pub struct ResultCache {
    entries: VecDeque<Arc<JobResult>>,
    capacity: usize,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&mut self, result: Arc<JobResult>) {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.key == result.key) {
            *slot = result;
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    pub fn get(&self, key: &JobKey) -> Option<Arc<JobResult>> {
        self.entries.iter().find(|e| &e.key == key).cloned()
    }

    /// Cached keys, oldest first.
    pub fn keys(&self) -> Vec<JobKey> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
